use crate::error::Result;
use super::types::StoreConfig;
use std::path::Path;

/// Parse a shelfdb.yaml file into a StoreConfig
pub fn parse_config(path: &Path) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a config YAML string into a StoreConfig
pub fn parse_config_str(content: &str) -> Result<StoreConfig> {
    let config: StoreConfig = serde_yaml::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Shape;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config_str("{}").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.lock.timeout(), Duration::from_millis(5000));
        assert_eq!(config.lock.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.backup.retention_days, 7);
        assert_eq!(config.backup.interval_hours, 24);
        assert!(config.cache.ttl().is_none());
        assert_eq!(config.backup_dir(), PathBuf::from("data/backups"));

        let defs = config.document_definitions();
        assert_eq!(defs.len(), 5);
        assert_eq!(defs["TRACKERS"].file, "trackers.json");
        assert_eq!(defs["TRACKERS"].shape, Shape::Keyed);
        assert_eq!(defs["CLUB"].shape, Shape::Object);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config_str(
            r#"
data_dir: /var/lib/bookbot
lock: { timeout_ms: 250, poll_interval_ms: 10 }
cache: { ttl_ms: 1000 }
backup:
  dir: /srv/snapshots
  interval_hours: 6
  retention_days: 14
documents:
  nominations: { file: nominations.json, shape: list }
  club: { file: club_info.json, shape: any }
"#,
        )
        .unwrap();

        assert_eq!(config.lock.timeout(), Duration::from_millis(250));
        assert_eq!(config.cache.ttl(), Some(Duration::from_millis(1000)));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/snapshots"));
        assert_eq!(config.backup.interval(), Duration::from_secs(6 * 3600));

        let defs = config.document_definitions();
        assert_eq!(defs["NOMINATIONS"].shape, Shape::List);
        // Configured entries override the built-ins
        assert_eq!(defs["CLUB"].file, "club_info.json");
        assert_eq!(defs["CLUB"].shape, Shape::Any);
        assert!(defs.contains_key("TRACKERS"));
    }

    #[test]
    fn test_without_defaults() {
        let config = parse_config_str(
            "include_defaults: false\ndocuments:\n  votes: { file: votes.json }\n",
        )
        .unwrap();
        let defs = config.document_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs["VOTES"].shape, Shape::Any);
    }

    #[test]
    fn test_unknown_shape_rejected() {
        let result = parse_config_str("documents:\n  x: { file: x.json, shape: table }\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_backup_settings_do_not_overflow() {
        let config = parse_config_str(
            "backup: { interval_hours: 18446744073709551615, retention_days: 9223372036854775807 }\n",
        )
        .unwrap();
        assert_eq!(config.backup.interval(), Duration::from_secs(u64::MAX));
        assert_eq!(config.backup.retention(), None);
        assert_eq!(
            parse_config_str("{}").unwrap().backup.retention(),
            Some(chrono::Duration::days(7))
        );
    }
}
