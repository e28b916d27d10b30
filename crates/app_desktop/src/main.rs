mod app;
mod text_field;

use std::sync::Arc;
use std::{fs, path::Path, path::PathBuf};

use config::{AppConfig, ConfigStore, EndpointOverrides};
use core_orchestrator::OperationSettings;
use gpui::{App, Application, Bounds, WindowBounds, WindowOptions, prelude::*, px, size};
use provider_aws::{AwsGatewayFactory, EndpointUrls};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::{AppDeps, LecternApp};

const DEFAULT_LOG_FILTER: &str = "info,app_desktop=debug,core_orchestrator=debug,provider_aws=debug";

fn main() {
    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push("lectern");
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let config_store = match ConfigStore::from_default_location() {
        Ok(store) => store,
        Err(err) => {
            error!("no config directory, using data dir: {err:#}");
            ConfigStore::from_dir(data_dir.join("config"))
        }
    };
    let config = match config_store.load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err:#}");
            AppConfig::default()
        }
    };
    info!(
        config = %config_store.path().display(),
        model = %config.agent.model_id,
        "lectern starting"
    );

    let factory = Arc::new(AwsGatewayFactory::new(
        endpoint_urls(&config.endpoints),
        config.agent.web_fetch_limit_bytes,
    ));
    let deps = AppDeps {
        settings: OperationSettings::from(&config),
        config,
        config_store,
        factory,
    };

    Application::new().run(move |cx: &mut App| {
        let bounds = Bounds::centered(None, size(px(980.0), px(820.0)), cx);
        let opened = cx.open_window(
            WindowOptions {
                window_bounds: Some(WindowBounds::Windowed(bounds)),
                titlebar: Some(gpui::TitlebarOptions {
                    title: Some("Lectern".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            move |window, cx| cx.new(|cx| LecternApp::new(deps, window, cx)),
        );
        if let Err(err) = opened {
            error!("failed to open main window: {err:#}");
            cx.quit();
            return;
        }
        cx.activate(true);
    });
}

fn endpoint_urls(endpoints: &EndpointOverrides) -> EndpointUrls {
    EndpointUrls {
        s3: endpoints.s3.clone(),
        bedrock_agent: endpoints.bedrock_agent.clone(),
        bedrock_agent_runtime: endpoints.bedrock_agent_runtime.clone(),
        bedrock_runtime: endpoints.bedrock_runtime.clone(),
    }
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "lectern.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_maps_onto_worker_settings() {
        let mut config = AppConfig::default();
        config.agent.max_rounds = 3;
        config.default_prefix = "lectures/".to_string();
        config.endpoints.s3 = Some("http://127.0.0.1:9000".to_string());

        let settings = OperationSettings::from(&config);
        assert_eq!(settings.agent.max_rounds, 3);
        assert_eq!(settings.agent.model_id, config.agent.model_id);
        assert_eq!(settings.default_prefix, "lectures/");
        assert_eq!(
            endpoint_urls(&config.endpoints).s3.as_deref(),
            Some("http://127.0.0.1:9000")
        );
    }
}
