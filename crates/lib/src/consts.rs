pub const APP_NAME: &str = "keel";

/// Prefix accepted in front of parameter names when read from the environment.
pub const ENV_PREFIX: &str = "KEEL_";

/// Environment variable that forces a host type instead of detecting one.
pub const HOST_OVERRIDE_ENV: &str = "KEEL_HOST";

/// Default build definition file name.
pub const DEFINITION_FILE: &str = "keel.toml";

/// Parameters file, relative to the directory containing the definition file.
pub const PARAMETERS_FILE: &str = ".keel/parameters.json";

/// Marker substituted for secret values in any rendered text.
pub const REDACTED: &str = "[REDACTED]";

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
