//! Command implementations.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use careerdesk_core::auth::{ChannelNavigator, Credentials, GuardDecision, Navigator};
use careerdesk_core::utils::{format_remaining, format_timestamp, Clock, SystemClock};
use careerdesk_core::{
    ApiClient, ApiError, Config, RouteGuard, Session, SessionManager, SessionStores,
    SessionWatcher, SignIn, Url,
};

use crate::cli::{Command, USAGE};

/// Email used when `--email` is not given
const EMAIL_ENV: &str = "CAREERDESK_EMAIL";

/// Password used instead of prompting
const PASSWORD_ENV: &str = "CAREERDESK_PASSWORD";

/// Prints redirects as links into the web app.
struct TerminalNavigator {
    app_url: Url,
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, to: &str) {
        eprintln!("-> {}", app_link(&self.app_url, to));
    }
}

fn app_link(app_url: &Url, path: &str) -> String {
    app_url
        .join(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| path.to_string())
}

fn app_url(config: &Config) -> Result<Url> {
    Url::parse(&config.app_url).with_context(|| format!("Invalid app_url: {}", config.app_url))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Load the session the way a page load does
fn load_session(config: &Config, stores: SessionStores, navigator: Box<dyn Navigator>) -> SessionManager {
    let mut manager =
        SessionManager::new(stores, navigator).with_sign_in_path(config.sign_in_path.clone());
    manager.initialize();
    manager
}

pub async fn run(command: Command, config: &mut Config, stores: SessionStores) -> Result<()> {
    let app_url = app_url(config)?;
    let terminal = || Box::new(TerminalNavigator { app_url: app_url.clone() });

    match command {
        Command::Login {
            email,
            remember,
            callback,
        } => {
            let manager = load_session(config, stores, terminal());
            login(config, manager, email, remember, callback).await
        }
        Command::Status => {
            status(&load_session(config, stores, terminal()));
            Ok(())
        }
        Command::Logout => {
            logout(load_session(config, stores, terminal()));
            Ok(())
        }
        Command::Guard { target } => guard(config, &app_url, &stores, &target),
        Command::Get { path } => get(config, load_session(config, stores, terminal()), &path).await,
        Command::Watch => watch(config, &app_url, stores).await,
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

fn prompt_email(default: Option<&str>) -> Result<String> {
    match default {
        Some(email) => print!("Email [{}]: ", email),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim();

    Ok(match (email.is_empty(), default) {
        (true, Some(default)) => default.to_string(),
        _ => email.to_string(),
    })
}

async fn login(
    config: &mut Config,
    manager: SessionManager,
    email: Option<String>,
    remember: bool,
    callback: Option<String>,
) -> Result<()> {
    let email = match email.or_else(|| env_var(EMAIL_ENV)) {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = match env_var(PASSWORD_ENV) {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    if email.is_empty() || password.is_empty() {
        bail!("Email and password required");
    }

    let session = manager.into_shared();
    let sign_in = SignIn::new(ApiClient::new(&config.api_url)?, config.cookie_max_age());
    let credentials = Credentials {
        email: email.clone(),
        password,
        remember,
    };

    if let Err(e) = sign_in.submit(&session, &credentials, callback.as_deref()).await {
        if let Some(ApiError::SignInRejected(message)) = e.downcast_ref::<ApiError>() {
            bail!("{}", message);
        }
        return Err(e);
    }

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    let manager = session.lock().await;
    if let Some(user) = manager.user() {
        println!("Signed in as {} ({})", user.name, user.role);
    }
    if !remember {
        println!("Not remembered: the next run will not see this user. Use --remember to stay signed in.");
    }
    Ok(())
}

fn status(manager: &SessionManager) {
    match manager.session() {
        Session::Unauthenticated => println!("Not signed in"),
        Session::Authenticated { user, expiry, .. } => {
            let remaining = *expiry - manager.now();
            println!("Signed in as {} <{}>", user.name, user.email);
            println!("Role:    {}", user.role);
            println!(
                "Expires: {} ({} left)",
                format_timestamp(*expiry),
                format_remaining(remaining)
            );
        }
    }
}

fn logout(mut manager: SessionManager) {
    let was_signed_in = manager.is_authenticated();
    manager.sign_out();
    if was_signed_in {
        println!("Signed out");
    } else {
        println!("Not signed in; cleared any leftover session data");
    }
}

fn guard(config: &Config, app_url: &Url, stores: &SessionStores, target: &str) -> Result<()> {
    let request = app_url
        .join(target)
        .with_context(|| format!("Invalid path or URL: {}", target))?;
    let guard = RouteGuard::from_config(config);

    match guard.check_jar(&request, &stores.cookies, SystemClock.now()) {
        GuardDecision::Continue => println!("{} -> served", request),
        GuardDecision::Redirect(to) => println!("{} -> redirect to {}", request, to),
    }
    Ok(())
}

async fn get(config: &Config, mut manager: SessionManager, path: &str) -> Result<()> {
    let Some(token) = manager.token().map(str::to_string) else {
        bail!("Not signed in. Run `careerdesk login` first.");
    };
    let api = ApiClient::new(&config.api_url)?.with_token(token);

    match api.get::<serde_json::Value>(path).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_auth_failure) {
                warn!("Server rejected the token, signing out");
                manager.sign_out();
            }
            Err(e)
        }
    }
}

async fn watch(config: &Config, app_url: &Url, stores: SessionStores) -> Result<()> {
    let (navigator, mut redirects) = ChannelNavigator::new();
    let manager = load_session(config, stores, Box::new(navigator));

    if !manager.is_authenticated() {
        if let Ok(to) = redirects.try_recv() {
            eprintln!("-> {}", app_link(app_url, &to));
        }
        bail!("Not signed in. Run `careerdesk login --remember` first.");
    }

    if let Some(user) = manager.user() {
        println!("Watching session for {}. Press Ctrl-C to stop.", user.email);
    }

    let mut changes = manager.subscribe();
    let session = manager.into_shared();
    let _watcher = SessionWatcher::spawn(session.clone(), config.check_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving session in place");
                break;
            }
            Some(to) = redirects.recv() => {
                println!("Session ended -> {}", app_link(app_url, &to));
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = changes.borrow_and_update().clone();
                debug!(authenticated = current.is_authenticated(), "Session changed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_link_joins_paths() {
        let base = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            app_link(&base, "/auth/sign-in"),
            "http://localhost:3000/auth/sign-in"
        );
        assert_eq!(app_link(&base, "/"), "http://localhost:3000/");
    }

    #[test]
    fn test_bad_app_url_is_reported() {
        let config = Config {
            app_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(app_url(&config).is_err());
    }

    #[tokio::test]
    async fn test_get_without_session_fails_before_any_request() {
        let config = Config {
            api_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        let manager = load_session(
            &config,
            SessionStores::in_memory(),
            Box::new(careerdesk_core::auth::RecordingNavigator::new()),
        );
        let err = get(&config, manager, "/api/job-posts").await.unwrap_err();
        assert!(err.to_string().contains("Not signed in"));
    }
}
