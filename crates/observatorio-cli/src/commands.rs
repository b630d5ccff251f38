//! Subcommands and their output.

use std::io::{self, BufRead, Write};

use anyhow::{Context as _, bail};
use clap::Subcommand;
use observatorio_client::{ApiClient, ApiConfig, IdentityProvider};
use observatorio_core::{
  case::{Case, CaseId},
  identity::NewUser,
  moderation::{Decision, NewAccessRequest, ReviewStatus},
  permission::Role,
  store::KeyValueStore,
};
use observatorio_sync::{Observatorio, SearchOptions, auth::LOGOUT_MESSAGE};
use uuid::Uuid;

use crate::settings::Settings;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create the root account unless one exists. Reads the password from
  /// stdin.
  BootstrapRoot {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name:  String,
  },

  /// Sign in. Reads the password from stdin.
  Login {
    #[arg(long)]
    email:    String,
    /// Keep the session until an explicit logout.
    #[arg(long)]
    remember: bool,
  },

  Logout,

  /// Show the signed-in account.
  Whoami,

  /// Change your password.
  Passwd,

  /// List cases. Only approved ones unless `--all` is given.
  List {
    #[arg(long)]
    all:  bool,
    #[arg(long)]
    json: bool,
  },

  /// Free-text search over the catalog.
  Search {
    query:    String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    region:   Option<String>,
    #[arg(long)]
    status:   Option<String>,
    /// Include unapproved cases (needs `view_all`).
    #[arg(long)]
    all:      bool,
    #[arg(long)]
    json:     bool,
  },

  /// Print one case as JSON.
  Show { id: CaseId },

  Stats,

  Approve { id: CaseId },

  Reject {
    id:     CaseId,
    #[arg(long)]
    reason: Option<String>,
  },

  Delete { id: CaseId },

  /// List every account.
  Users,

  /// Ask for an account with an elevated role.
  RequestAccess {
    #[arg(long)]
    name:          String,
    #[arg(long)]
    email:         String,
    #[arg(long, value_parser = parse_role)]
    role:          Role,
    #[arg(long, default_value = "")]
    justification: String,
  },

  /// List pending access requests.
  Requests,

  /// Approve an access request.
  Grant { id: Uuid },

  /// Reject an access request.
  Deny {
    id:     Uuid,
    #[arg(long)]
    reason: Option<String>,
  },

  /// Exchange the code from the login redirect for API tokens. Remote
  /// writes use them from then on.
  ApiLogin {
    #[arg(long)]
    code:     String,
    /// Must match the `--redirect` given to `login-url`.
    #[arg(long)]
    redirect: String,
  },

  /// Print the identity-provider login URL for the hosted deployment.
  LoginUrl {
    #[arg(long)]
    redirect:   String,
    /// Social connection, e.g. `google-oauth2`.
    #[arg(long)]
    connection: Option<String>,
  },
}

pub async fn run<S: KeyValueStore + 'static>(
  app: &Observatorio<S>,
  settings: &Settings,
  command: Command,
) -> anyhow::Result<()> {
  match command {
    Command::BootstrapRoot { email, name } => {
      let password = read_password("Password: ")?;
      let root = app
        .auth
        .ensure_root(NewUser::new(email, name, Role::Researcher, password))
        .await?;
      println!("root account: {}", root.email);
    }

    Command::Login { email, remember } => {
      let password = read_password("Password: ")?;
      let who = app.auth.login(&email, &password, remember).await?;
      println!("signed in as {} ({})", who.name, who.role);
      if who.must_change_password {
        eprintln!("this password is temporary; run `observatorio passwd`");
      }
    }

    Command::Logout => {
      app.set_api_tokens(None).await?;
      if app.auth.logout(false, None).await? {
        println!("{LOGOUT_MESSAGE}");
      } else {
        println!("not signed in");
      }
    }

    Command::Whoami => match app.auth.current_user() {
      Some(who) => {
        let flags = match (who.root, who.has_admin_rights(), who.demo) {
          (true, ..) => " [root]",
          (_, true, false) => " [admin]",
          (_, _, true) => " [demo]",
          _ => "",
        };
        println!("{} <{}> {}{flags}", who.name, who.email, who.role);
      }
      None => println!("not signed in"),
    },

    Command::Passwd => {
      let old = read_password("Current password: ")?;
      let new = read_password("New password: ")?;
      app.auth.change_password(&old, &new).await?;
      println!("password changed");
    }

    Command::List { all, json } => {
      let cases = if all {
        let options = SearchOptions { include_unapproved: true, ..SearchOptions::default() };
        app.cases.search_casos("", &options).await?
      } else {
        app.cases.get_casos().into_iter().filter(|c| c.approved).collect()
      };
      print_cases(&cases, json)?;
    }

    Command::Search { query, category, region, status, all, json } => {
      let options = SearchOptions { category, region, status, include_unapproved: all };
      print_cases(&app.cases.search_casos(&query, &options).await?, json)?;
    }

    Command::Show { id } => match app.cases.get_caso(id).await? {
      Some(case) => println!("{}", serde_json::to_string_pretty(&case)?),
      None => bail!("case {id} not found"),
    },

    Command::Stats => {
      let s = app.cases.stats().await?;
      println!("casos:         {} ({} aprovados, {} pendentes)", s.total_casos, s.casos_aprovados, s.casos_pendentes);
      println!("categorias:    {}", s.categorias);
      println!("regiões:       {}", s.regioes);
      println!("organizações:  {}", s.organizacoes);
      println!("beneficiários: {}", s.beneficiarios);
    }

    Command::Approve { id } => {
      let case = app.cases.approve_caso(id).await?;
      println!("approved #{} {}", case.id, case.title());
    }

    Command::Reject { id, reason } => {
      let case = app.cases.reject_caso(id, reason).await?;
      println!("rejected #{} {}", case.id, case.title());
    }

    Command::Delete { id } => {
      let case = app.cases.delete_caso(id).await?;
      println!("deleted #{} {}", case.id, case.title());
    }

    Command::Users => {
      for who in app.auth.users().await? {
        let state = if who.active { "" } else { " (disabled)" };
        println!("{}  {:<32} {:<18}{state}", who.id, who.email, who.role.to_string());
      }
    }

    Command::RequestAccess { name, email, role, justification } => {
      let request = app
        .moderation
        .request_access(NewAccessRequest { name, email, requested_role: role, justification })
        .await?;
      println!("request {} filed", request.id);
    }

    Command::Requests => {
      for r in app.moderation.list_access_requests(Some(ReviewStatus::Pending)).await? {
        println!("{}  {:<32} {:<18} {}", r.id, r.email, r.requested_role.to_string(), r.justification);
      }
    }

    Command::Grant { id } => {
      let decision = app.moderation.process_access_request(id, Decision::Approve).await?;
      if let Some(account) = decision.account {
        println!("{} is now {}", account.email, account.role);
      }
      if let Some(password) = decision.temporary_password {
        println!("temporary password: {password}");
      }
    }

    Command::Deny { id, reason } => {
      app
        .moderation
        .process_access_request(id, Decision::Reject { reason })
        .await?;
      println!("request {id} rejected");
    }

    Command::ApiLogin { code, redirect } => {
      let idp = identity_provider(settings).await?;
      let tokens = idp
        .exchange_code(&code, &redirect)
        .await
        .context("code exchange failed")?;
      app.set_api_tokens(Some(tokens)).await?;
      if app.cases.api().is_some() {
        println!("API tokens stored");
      } else {
        println!("API tokens stored; the API is unreachable, so cases stay local for now");
      }
    }

    Command::LoginUrl { redirect, connection } => {
      let idp = identity_provider(settings).await?;
      let state = Uuid::new_v4().simple().to_string();
      println!("{}", idp.authorize_url(&redirect, &state, connection.as_deref())?);
    }
  }

  // Renewals during the command replace the stored pair.
  app.save_api_tokens().await?;
  Ok(())
}

async fn identity_provider(settings: &Settings) -> anyhow::Result<IdentityProvider> {
  let api = ApiClient::new(ApiConfig::new(settings.sync.api_base_url.clone()))?;
  let public = api
    .public_config()
    .await
    .context("failed to fetch identity-provider settings")?;
  Ok(IdentityProvider::new(public)?)
}

/// The client for hosted mode. Without identity-provider settings it still
/// works, but cannot renew an expired token.
pub async fn api_client(settings: &Settings) -> anyhow::Result<ApiClient> {
  let api = ApiClient::new(ApiConfig::new(settings.sync.api_base_url.clone()))?;
  match identity_provider(settings).await {
    Ok(idp) => Ok(api.with_identity_provider(idp)),
    Err(err) => {
      tracing::warn!(error = %format!("{err:#}"), "token renewal unavailable");
      Ok(api)
    }
  }
}

fn print_cases(cases: &[Case], json: bool) -> anyhow::Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(cases)?);
    return Ok(());
  }
  for case in cases {
    let mark = if case.approved { ' ' } else { '*' };
    println!(
      "{:>5}{mark} {:<40} {} / {}",
      case.id,
      case.title(),
      case.details.category,
      case.details.region,
    );
  }
  Ok(())
}

fn parse_role(s: &str) -> Result<Role, String> {
  match serde_json::from_value(serde_json::Value::String(s.to_owned())) {
    Ok(Role::Unknown) | Err(_) => {
      Err(format!("unknown role {s:?}; expected visitor, extension-student or researcher"))
    }
    Ok(role) => Ok(role),
  }
}

/// Read a password line from stdin.
fn read_password(prompt: &str) -> anyhow::Result<String> {
  eprint!("{prompt}");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roles_parse_by_wire_name() {
    assert_eq!(parse_role("extension-student"), Ok(Role::ExtensionStudent));
    assert_eq!(parse_role("researcher"), Ok(Role::Researcher));
    assert!(parse_role("admin").is_err());
    assert!(parse_role("unknown").is_err());
  }
}
