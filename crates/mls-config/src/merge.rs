use crate::config::Config;
use crate::error::ConfigError;

/// Layer a TOML document over `base`.
///
/// Keys present in `overlay_toml` win; everything else keeps the value
/// from `base`. Nested tables such as `[multiLanguageServer.html]` are
/// merged key by key rather than replaced wholesale.
pub fn overlay_config(base: &Config, overlay_toml: &str, origin: &str) -> Result<Config, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        origin: origin.to_string(),
        message,
    };

    let mut merged = toml::Value::try_from(base).map_err(|e| parse_err(e.to_string()))?;
    let overlay: toml::Value = toml::from_str(overlay_toml).map_err(|e| parse_err(e.to_string()))?;

    merge_tables(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| parse_err(e.to_string()))
}

fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_tables(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
