use institution_sso::config::SsoConfig;
use institution_sso::maintenance;
use institution_sso::models::ProviderId;
use institution_sso::startup::Application;
use service_core::error::AppError;
use service_core::observability::init_tracing;

const USAGE: &str =
    "usage: institution-sso unlink-not-migrated <provider-id> <current-user-id-attribute> [provider-name]";

struct UnlinkArgs {
    provider_id: ProviderId,
    current_attribute: String,
    provider_name: Option<String>,
}

fn parse_args(args: &[String]) -> Option<UnlinkArgs> {
    match args {
        [command, provider_id, current_attribute, rest @ ..]
            if command == "unlink-not-migrated" && rest.len() <= 1 =>
        {
            Some(UnlinkArgs {
                provider_id: ProviderId::from(provider_id.as_str()),
                current_attribute: current_attribute.clone(),
                provider_name: rest.first().cloned(),
            })
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = SsoConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.common.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing error: {}", e)))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid arguments",
        ));
    };

    let app = Application::build(&config).await.map_err(|e| {
        tracing::error!(kind = e.kind(), "Failed to initialize services: {}", e);
        std::io::Error::other(format!("Initialization error: {}", e))
    })?;

    app.db.health_check().await.map_err(|e| {
        tracing::error!(kind = e.kind(), "MongoDB is not reachable: {}", e);
        std::io::Error::other(format!("Database error: {}", e))
    })?;

    let report = maintenance::unlink_not_migrated(
        &app.users,
        &app.identities,
        &args.provider_id,
        args.provider_name.as_deref(),
        &args.current_attribute,
    )
    .await
    .map_err(|e| {
        let e = AppError::from(e);
        tracing::error!(kind = e.kind(), "Unlink job failed: {}", e);
        std::io::Error::other(format!("Unlink job error: {}", e))
    })?;

    tracing::info!(
        candidates = report.candidates,
        unlinked = report.unlinked,
        failed = report.failed,
        "Unlink job complete"
    );

    if report.failed > 0 {
        return Err(std::io::Error::other(format!(
            "{} of {} users could not be unlinked",
            report.failed, report.candidates
        )));
    }
    Ok(())
}
