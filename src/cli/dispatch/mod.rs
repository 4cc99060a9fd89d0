//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, collaborators, ARG_ALLOWED_ORIGIN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let allowed_origin = matches.get_one::<String>(ARG_ALLOWED_ORIGIN).cloned();

    let collaborators = collaborators::Options::parse(matches)?;
    let auth = auth::Options::parse(matches, collaborators.timeout)?;

    Ok(Action::Server(Args {
        port,
        allowed_origin,
        auth,
        collaborators,
    }))
}
