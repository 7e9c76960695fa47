use eyre::Result;
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::config::{LogFormat, LogProperties, NotaryServerProperties};

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let f = fmt::layer().with_thread_ids(true).with_thread_names(true);
    match format {
        LogFormat::Compact => f.compact().boxed(),
        LogFormat::Json => f.json().boxed(),
    }
}

/// Returns the filter directives for the given log settings.
fn directives(log: &LogProperties) -> Result<String> {
    match &log.filter {
        Some(filter) => Ok(filter.clone()),
        None => {
            let level = Level::from_str(&log.level)?;
            Ok(format!(
                "notary_server={level},tlsproof_verifier={level},tlsproof_common={level}"
            ))
        }
    }
}

pub fn init_tracing(config: &NotaryServerProperties) -> Result<()> {
    let filter_layer = EnvFilter::builder().parse(directives(&config.log)?)?;

    Registry::default()
        .with(filter_layer)
        .with(format_layer(config.log.format))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_directives() {
        let log = LogProperties {
            level: "info".to_string(),
            ..Default::default()
        };

        assert_eq!(
            directives(&log).unwrap(),
            "notary_server=INFO,tlsproof_verifier=INFO,tlsproof_common=INFO"
        );
    }

    #[test]
    fn test_custom_filter() {
        let log = LogProperties {
            filter: Some("warn,notary_server=trace".to_string()),
            ..Default::default()
        };

        assert_eq!(directives(&log).unwrap(), "warn,notary_server=trace");
    }

    #[test]
    fn test_invalid_level() {
        let log = LogProperties {
            level: "loud".to_string(),
            ..Default::default()
        };

        assert!(directives(&log).is_err());
    }
}
