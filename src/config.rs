use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::packer::PackingConfig;

/// Complete service configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub packing: PackingSettings,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_string)
    }

    /// Creates a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_lookup(&lookup),
            packing: PackingSettings::from_lookup(&lookup),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "BOXSTACK_API_HOST";
    const PORT_VAR: &'static str = "BOXSTACK_API_PORT";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let host_value = lookup(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                log::warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (IpAddr::V4(Ipv4Addr::UNSPECIFIED), Self::DEFAULT_HOST.to_string())
            }
        };

        let port = load_with_warning(
            lookup,
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |value: u16| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether the server binds to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Packing parameters applied to every request.
#[derive(Clone, Debug)]
pub struct PackingSettings {
    packing: PackingConfig,
}

impl PackingSettings {
    const BALANCE_VAR: &'static str = "BOXSTACK_MAX_BOXES_TO_BALANCE_WEIGHT";
    const LOOKAHEAD_VAR: &'static str = "BOXSTACK_LOOKAHEAD_ITEM_LIMIT";
    const TIMEOUT_VAR: &'static str = "BOXSTACK_TIMEOUT_MS";
    const PARALLEL_VAR: &'static str = "BOXSTACK_PARALLEL_BOX_EVALUATION";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let max_boxes = load_with_warning(
            lookup,
            Self::BALANCE_VAR,
            PackingConfig::DEFAULT_MAX_BOXES_TO_BALANCE_WEIGHT,
            |_| true,
            "",
        );

        let lookahead = load_with_warning(
            lookup,
            Self::LOOKAHEAD_VAR,
            PackingConfig::DEFAULT_LOOKAHEAD_ITEM_LIMIT,
            |value: usize| value <= 64,
            "must be at most 64",
        );

        // 0 disables the budget.
        let timeout_ms = load_with_warning(lookup, Self::TIMEOUT_VAR, 0_u64, |_| true, "");

        let parallel = lookup(Self::PARALLEL_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_VAR))
            .unwrap_or(false);

        let mut builder = PackingConfig::builder()
            .max_boxes_to_balance_weight(max_boxes)
            .lookahead_item_limit(lookahead)
            .parallel_box_evaluation(parallel);
        if timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        Self {
            packing: builder.build(),
        }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            log::warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            log::warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn load_with_warning<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + PartialEq + Display,
    T::Err: Display,
{
    match lookup(var_name) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if validator(value) => {
                if value != default {
                    log::info!("{} = {} (default {})", var_name, value, default);
                }
                value
            }
            Ok(_) => {
                log::warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name,
                    raw,
                    invalid_hint,
                    default
                );
                default
            }
            Err(err) => {
                log::warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name,
                    raw,
                    err,
                    default
                );
                default
            }
        },
        None => default,
    }
}
