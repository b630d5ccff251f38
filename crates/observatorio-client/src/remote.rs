//! [`RemoteCaseStore`]: the remote-API implementation of [`CaseStore`].

use observatorio_core::{
  Entity, Error, Result,
  case::{Case, CaseFilter, CaseId},
  store::{CaseInsert, CaseStore},
};

use crate::ApiClient;

/// Per-record case persistence over the HTTP API. Every write is a single
/// request; the server owns id assignment.
#[derive(Clone)]
pub struct RemoteCaseStore {
  api: ApiClient,
}

impl RemoteCaseStore {
  pub fn new(api: ApiClient) -> Self { Self { api } }

  pub fn api(&self) -> &ApiClient { &self.api }
}

impl CaseStore for RemoteCaseStore {
  async fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
    Ok(self.api.list_cases(filter).await?)
  }

  async fn get(&self, id: CaseId) -> Result<Option<Case>> {
    Ok(self.api.get_case(id).await?)
  }

  async fn create(&self, input: CaseInsert) -> Result<Case> {
    Ok(self.api.create_case(&input).await?)
  }

  async fn update(&self, case: Case) -> Result<Case> {
    Ok(self.api.update_case(&case).await?)
  }

  async fn delete(&self, id: CaseId) -> Result<Case> {
    let existing = self
      .api
      .get_case(id)
      .await?
      .ok_or_else(|| Error::not_found(Entity::Case, id))?;
    self.api.delete_case(id).await?;
    Ok(existing)
  }
}
