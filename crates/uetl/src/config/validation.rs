//! Configuration validation.

use std::collections::HashSet;

use super::{Config, SourceConfig};
use crate::error::{EtlError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let wh = &config.warehouse;
    if wh.host.trim().is_empty() {
        return Err(EtlError::Config("warehouse.host is required".into()));
    }
    if wh.database.trim().is_empty() {
        return Err(EtlError::Config("warehouse.database is required".into()));
    }
    if wh.user.trim().is_empty() {
        return Err(EtlError::Config("warehouse.user is required".into()));
    }
    if wh.connect_timeout == 0 {
        return Err(EtlError::Config(
            "warehouse.connect_timeout must be at least 1".into(),
        ));
    }

    let mut names = HashSet::new();
    for source in &config.sources {
        validate_source(source)?;
        if !names.insert(source.name()) {
            return Err(EtlError::Config(format!(
                "duplicate source name '{}'",
                source.name()
            )));
        }
    }

    let mut tables = HashSet::new();
    for table in &config.tables {
        if table.name.trim().is_empty() {
            return Err(EtlError::Config("tables[].name is required".into()));
        }
        if table.ddl.trim().is_empty() {
            return Err(EtlError::Config(format!(
                "table '{}' has an empty ddl",
                table.name
            )));
        }
        if !tables.insert(table.name.as_str()) {
            return Err(EtlError::Config(format!(
                "duplicate table name '{}'",
                table.name
            )));
        }
    }

    Ok(())
}

fn validate_source(source: &SourceConfig) -> Result<()> {
    let name = source.name();
    if name.trim().is_empty() {
        return Err(EtlError::Config("sources[].name is required".into()));
    }
    for (field, value) in [
        ("host", source.host()),
        ("database", source.database()),
        ("user", source.user()),
    ] {
        if value.trim().is_empty() {
            return Err(EtlError::Config(format!(
                "source '{}': {} is required",
                name, field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::from_yaml(
            r#"
warehouse:
  host: localhost
  database: dw
  user: etl
  password: pw
sources:
  - type: mssql
    name: erp
    host: sql01
    database: sales
    user: reader
tables:
  - name: dim_date
    ddl: CREATE TABLE dim_date (date_sk BIGINT)
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_warehouse_host() {
        let mut config = valid_config();
        config.warehouse.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("warehouse.host"));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid_config();
        config.warehouse.connect_timeout = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_source_name() {
        let mut config = valid_config();
        let dup = config.sources[0].clone();
        config.sources.push(dup);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate source name 'erp'"));
    }

    #[test]
    fn test_duplicate_table_name() {
        let mut config = valid_config();
        let dup = config.tables[0].clone();
        config.tables.push(dup);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_missing_user() {
        let mut config = valid_config();
        if let SourceConfig::Mssql(c) = &mut config.sources[0] {
            c.user = " ".into();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source 'erp': user is required"));
    }
}
