use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

use crate::auth::AuthConfig;

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_REMEMBER_TTL_SECONDS: &str = "remember-ttl-seconds";
pub const ARG_LOGIN_ATTEMPTS: &str = "login-attempts";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "login-window-seconds";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";
pub const ARG_SECURE_COOKIES: &str = "secure-cookies";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

/// Longest accepted session lifetime (100 years); keeps expiry timestamps representable.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Options {
    pub session_ttl_seconds: u64,
    pub remember_ttl_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub store_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub secure_cookies: bool,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value with a default is somehow missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            session_ttl_seconds: seconds(ARG_SESSION_TTL_SECONDS)?,
            remember_ttl_seconds: seconds(ARG_REMEMBER_TTL_SECONDS)?,
            login_attempts: matches
                .get_one::<u32>(ARG_LOGIN_ATTEMPTS)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_LOGIN_ATTEMPTS}"))?,
            login_window_seconds: seconds(ARG_LOGIN_WINDOW_SECONDS)?,
            store_timeout_seconds: seconds(ARG_STORE_TIMEOUT_SECONDS)?,
            sweep_interval_seconds: seconds(ARG_SWEEP_INTERVAL_SECONDS)?,
            secure_cookies: matches.get_flag(ARG_SECURE_COOKIES),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_session_ttl(Duration::from_secs(self.session_ttl_seconds))
            .with_remember_ttl(Duration::from_secs(self.remember_ttl_seconds))
            .with_login_attempts(
                self.login_attempts,
                Duration::from_secs(self.login_window_seconds),
            )
            .with_store_timeout(Duration::from_secs(self.store_timeout_seconds))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_seconds))
            .with_secure_cookies(self.secure_cookies)
            .with_trust_proxy_headers(self.trust_proxy_headers)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_throttle_args(command);
    with_transport_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("MYRUNES_SESSION_TTL_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REMEMBER_TTL_SECONDS)
                .long(ARG_REMEMBER_TTL_SECONDS)
                .help("Session lifetime in seconds when the client asks to be remembered")
                .env("MYRUNES_REMEMBER_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("How often expired sessions are purged, in seconds")
                .env("MYRUNES_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_throttle_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_ATTEMPTS)
                .long(ARG_LOGIN_ATTEMPTS)
                .help("Failed logins allowed per client address within the login window")
                .env("MYRUNES_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long(ARG_LOGIN_WINDOW_SECONDS)
                .help("Time for a client to regain all login attempts, in seconds")
                .env("MYRUNES_LOGIN_WINDOW_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Upper bound for a single store call, in seconds")
                .env("MYRUNES_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_transport_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SECURE_COOKIES)
                .long(ARG_SECURE_COOKIES)
                .help("Mark session cookies Secure (serve over HTTPS)")
                .env("MYRUNES_SECURE_COOKIES")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Take the client address from X-Real-IP or the last X-Forwarded-For hop")
                .long_help(
                    "Take the client address from X-Real-IP, or else the last X-Forwarded-For hop.\n\nOnly enable behind a reverse proxy that sets X-Real-IP or appends to X-Forwarded-For; otherwise clients can pick their own address and dodge login throttling.",
                )
                .env("MYRUNES_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn command() -> Command {
        with_args(Command::new("myrunes"))
    }

    #[test]
    fn defaults_match_auth_config() -> Result<()> {
        temp_env::with_vars_unset(
            [
                "MYRUNES_SESSION_TTL_SECONDS",
                "MYRUNES_SECURE_COOKIES",
                "MYRUNES_TRUST_PROXY_HEADERS",
            ],
            || {
                let matches = command().get_matches_from(vec!["myrunes"]);
                let options = Options::parse(&matches)?;

                assert_eq!(options.session_ttl_seconds, 7200);
                assert_eq!(options.remember_ttl_seconds, 2_592_000);
                assert_eq!(options.login_attempts, 5);
                assert_eq!(options.login_window_seconds, 300);
                assert_eq!(options.store_timeout_seconds, 5);
                assert_eq!(options.sweep_interval_seconds, 300);
                assert!(!options.secure_cookies);
                assert!(!options.trust_proxy_headers);

                let config = options.auth_config();
                let defaults = AuthConfig::new();
                assert_eq!(config.session_ttl(), defaults.session_ttl());
                assert_eq!(config.remember_ttl(), defaults.remember_ttl());
                assert_eq!(
                    config.login_refill_interval(),
                    defaults.login_refill_interval()
                );
                assert_eq!(config.sweep_interval(), defaults.sweep_interval());
                Ok(())
            },
        )
    }

    #[test]
    fn flags_and_values() -> Result<()> {
        let matches = command().get_matches_from(vec![
            "myrunes",
            "--login-attempts",
            "10",
            "--login-window-seconds",
            "60",
            "--secure-cookies",
            "--trust-proxy-headers",
        ]);
        let config = Options::parse(&matches)?.auth_config();

        assert_eq!(config.login_attempts(), 10);
        assert_eq!(config.login_refill_interval(), Duration::from_secs(6));
        assert!(config.secure_cookies());
        assert!(config.trust_proxy_headers());
        Ok(())
    }

    #[test]
    fn zero_attempts_rejected() {
        let result = command().try_get_matches_from(vec!["myrunes", "--login-attempts", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_ttl_rejected() {
        for arg in ["--remember-ttl-seconds", "--session-ttl-seconds"] {
            let result =
                command().try_get_matches_from(vec!["myrunes", arg, "18446744073709551615"]);
            assert!(result.is_err(), "{arg} accepted an unrepresentable lifetime");
        }

        let max = MAX_TTL_SECONDS.to_string();
        let result = command().try_get_matches_from(vec!["myrunes", "--remember-ttl-seconds", &max]);
        assert!(result.is_ok());
    }

    #[test]
    fn env_overrides() {
        temp_env::with_vars(
            [
                ("MYRUNES_SESSION_TTL_SECONDS", Some("60")),
                ("MYRUNES_SECURE_COOKIES", Some("true")),
                ("MYRUNES_TRUST_PROXY_HEADERS", Some("false")),
            ],
            || {
                let matches = command().get_matches_from(vec!["myrunes"]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert_eq!(options.session_ttl_seconds, 60);
                    assert!(options.secure_cookies);
                    assert!(!options.trust_proxy_headers);
                }
            },
        );
    }
}
