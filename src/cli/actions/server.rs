use crate::{
    api::{self, handlers::AppState},
    auth::{AuthEngine, MemoryAccountStore, SessionEvent},
    cli::{
        commands::{auth, collaborators},
        telemetry,
    },
    clock::SystemClock,
    collaborators::{
        BiometricMatcher, Collaborators, HttpBiometricMatcher, HttpKycVerifier, HttpNotifier,
        KycVerifier, LogNotifier, Notifier, PendingKycVerifier, SampleInbox, UnavailableMatcher,
    },
};
use anyhow::{anyhow, Context, Result};
use axum::http::HeaderValue;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub auth: auth::Options,
    pub collaborators: collaborators::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a collaborator endpoint is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let allowed_origin = args
        .allowed_origin
        .as_deref()
        .map(origin_header)
        .transpose()?;

    let inbox = SampleInbox::new();
    let collaborators = build_collaborators(&args.collaborators, &inbox)?;
    let engine = AuthEngine::new(
        args.auth.config,
        Arc::new(MemoryAccountStore::new()),
        collaborators,
        Arc::new(SystemClock),
    );
    spawn_event_log(engine.subscribe());

    let state = Arc::new(
        AppState::new(engine, inbox).with_pending_ttl_seconds(args.auth.pending_ttl_seconds),
    );

    let result = api::new(args.port, state, allowed_origin, args.auth.sweep_interval).await;
    telemetry::shutdown_tracer();
    result
}

/// HTTP adapters where an endpoint is configured, in-process ones otherwise.
fn build_collaborators(
    options: &collaborators::Options,
    inbox: &SampleInbox,
) -> Result<Collaborators> {
    let notifier: Arc<dyn Notifier> = match &options.notifier_url {
        Some(url) => Arc::new(
            HttpNotifier::new(url, options.token.clone(), options.timeout)
                .context("Invalid notifier URL")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let matcher: Arc<dyn BiometricMatcher> = match &options.matcher_url {
        Some(url) => Arc::new(
            HttpBiometricMatcher::new(url, options.token.clone(), options.timeout)
                .context("Invalid matcher URL")?,
        ),
        None => Arc::new(UnavailableMatcher),
    };
    let kyc: Arc<dyn KycVerifier> = match &options.kyc_url {
        Some(url) => Arc::new(
            HttpKycVerifier::new(url, options.token.clone(), options.timeout)
                .context("Invalid KYC URL")?,
        ),
        None => Arc::new(PendingKycVerifier),
    };

    Ok(Collaborators {
        notifier,
        matcher,
        samples: Arc::new(inbox.clone()),
        kyc,
    })
}

/// Log every session end; forced logouts at warn level.
fn spawn_event_log(mut events: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::ForcedLogout {
                    session_id,
                    account_id,
                    reason,
                }) => warn!(%session_id, %account_id, %reason, "forced logout"),
                Ok(SessionEvent::Ended {
                    session_id, reason, ..
                }) => info!(%session_id, %reason, "session ended"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "session event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn origin_header(origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(origin).with_context(|| format!("Invalid allowed origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Allowed origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    HeaderValue::from_str(&format!("{}://{}{}", parsed.scheme(), host, port))
        .context("Failed to build origin header")
}

fn log_startup_args(args: &Args) {
    let adapter = |url: &Option<String>, fallback: &'static str| {
        url.as_deref().map_or(fallback.to_string(), ToString::to_string)
    };
    info!(
        port = args.port,
        factor_policy = %args.auth.config.factor_policy(),
        session_ttl_seconds = args.auth.config.session_ttl_seconds(),
        notifier = %adapter(&args.collaborators.notifier_url, "log"),
        matcher = %adapter(&args.collaborators.matcher_url, "unavailable"),
        kyc = %adapter(&args.collaborators.kyc_url, "pending"),
        "starting server"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn origin_header_drops_path() -> Result<()> {
        let header = origin_header("https://app.vigilo.dev:8443/login")?;
        assert_eq!(header, "https://app.vigilo.dev:8443");
        assert!(origin_header("not a url").is_err());
        Ok(())
    }

    #[test]
    fn http_adapters_reject_invalid_urls() {
        let options = collaborators::Options {
            notifier_url: Some("::nope::".to_string()),
            matcher_url: None,
            kyc_url: None,
            token: None,
            timeout: Duration::from_secs(1),
        };
        assert!(build_collaborators(&options, &SampleInbox::new()).is_err());
    }

    #[test]
    fn local_adapters_when_unconfigured() {
        let options = collaborators::Options {
            notifier_url: None,
            matcher_url: None,
            kyc_url: None,
            token: None,
            timeout: Duration::from_secs(1),
        };
        assert!(build_collaborators(&options, &SampleInbox::new()).is_ok());
    }
}
