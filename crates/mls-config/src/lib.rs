pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod resolve;
pub mod validate;

pub use config::{Config, LanguageToggle, LogConfig, LogLevel, PythonSection, ServerSection, SECTION};
pub use error::ConfigError;
pub use load::{config_files, load_config, load_from_str, LoadedConfig};
pub use resolve::{resolve, resolve_interpreter, FeatureToggles, Settings, DEFAULT_INTERPRETER};
