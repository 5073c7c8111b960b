use anyhow::Context;

use image_guard::config::{GuardConfig, ServiceConfig};
use image_guard::server::{build_app, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = ServiceConfig::from_env();

    // Initialize tracing (stdout, plus a daily file when a log dir is set)
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match &service.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "image-guard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    let config = GuardConfig::load(&service.config_path).with_context(|| {
        format!(
            "failed to load moderation config from {}",
            service.config_path.display()
        )
    })?;

    eprintln!("🛡️  image-guard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", service.config_path.display());
    eprintln!("   Events: http://{}/onebot/event", service.bind_addr);
    eprintln!("   OneBot API: {}", service.onebot_api_url);
    eprintln!(
        "   Group scope: {}",
        if config.group_scope.is_empty() {
            "none".to_string()
        } else {
            config.group_scope.join(", ")
        }
    );
    eprintln!(
        "   Rules: {} texts, {} descriptions (probability {})",
        config.sensitive_texts.len(),
        config.forbidden_descriptions.len(),
        config.check_probability
    );

    match (&service.fallback_llm, config.classifier.has_direct_endpoint()) {
        (_, true) => eprintln!("   Classifier: direct endpoint"),
        (Some(llm), false) => eprintln!("   Classifier: fallback provider ({})", llm.model),
        (None, false) => eprintln!("   Classifier: none configured (audits will fail open)"),
    }

    let app = build_app(&service, config).context("failed to wire moderation service")?;

    serve(&service.bind_addr, app).await?;
    Ok(())
}
