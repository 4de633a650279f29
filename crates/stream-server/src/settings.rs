//! Settings loading: defaults, optional `signals.toml`, then `SIGNALS__*` environment variables

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};

use signals_core::AppConfig;

/// Base name of the optional settings file (any format the `config` crate knows)
pub const SETTINGS_FILE: &str = "signals";

/// Prefix for environment overrides, e.g. `SIGNALS__REFRESH__INTERVAL_MS=5000`
pub const ENV_PREFIX: &str = "SIGNALS";

/// Dotenv file read from the working directory
pub const ENV_FILE: &str = ".env";

/// Load `.env` into the process environment and return its path if one was read.
///
/// Call before logging starts so the file can carry `RUST_LOG`.
pub fn load_env() -> Option<PathBuf> {
    load_env_file(Path::new(ENV_FILE))
}

fn load_env_file(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok()?;
    Some(path.to_path_buf())
}

/// Layer the settings file and environment over the defaults
pub fn load() -> anyhow::Result<AppConfig> {
    load_from(SETTINGS_FILE, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn load_from(file: &str, env: Environment) -> anyhow::Result<AppConfig> {
    let settings = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(env)
        .build()?;

    let app: AppConfig = settings.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
