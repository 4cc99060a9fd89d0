pub mod auth;
pub mod collaborators;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_ALLOWED_ORIGIN: &str = "allowed-origin";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("vigilo")
        .about("Multi-factor authentication and session integrity")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("VIGILO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ALLOWED_ORIGIN)
                .long(ARG_ALLOWED_ORIGIN)
                .help("Origin allowed by CORS, for example https://app.vigilo.dev (any when unset)")
                .env("VIGILO_ALLOWED_ORIGIN"),
        );

    let command = auth::with_args(command);
    let command = collaborators::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "vigilo");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Multi-factor authentication and session integrity".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port() {
        temp_env::with_vars([("VIGILO_PORT", None::<&str>)], || {
            let matches = new().get_matches_from(vec!["vigilo", "--port", "9090"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));

            let matches = new().get_matches_from(vec!["vigilo"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("VIGILO_PORT", Some("443")),
                ("VIGILO_ALLOWED_ORIGIN", Some("https://app.vigilo.dev")),
                ("VIGILO_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["vigilo"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(ARG_ALLOWED_ORIGIN).cloned(),
                    Some("https://app.vigilo.dev".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("VIGILO_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["vigilo"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5 {
            temp_env::with_vars([("VIGILO_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["vigilo".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }
                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
