use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubely::config::AppConfig;
use tubely::infrastructure::database;
use tubely::services::videos::VideoService;
use tubely::utils::auth::create_jwt;

/// Mints a bearer token for a user, optionally seeding a video record they own.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// User id placed in the token subject
    #[arg(short, long)]
    user: String,

    /// Signing secret (defaults to JWT_SECRET)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Token lifetime in hours
    #[arg(long, default_value_t = 24)]
    ttl_hours: i64,

    /// Also create a video record with this title owned by the user
    #[arg(long)]
    create_video: Option<String>,
}

fn token_ttl(hours: i64) -> anyhow::Result<chrono::Duration> {
    if hours <= 0 {
        anyhow::bail!("--ttl-hours must be positive");
    }
    match chrono::Duration::try_hours(hours) {
        Some(ttl) => Ok(ttl),
        None => anyhow::bail!("--ttl-hours {} is out of range", hours),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mint_token=info,tubely=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env();
    let secret = args.secret.unwrap_or_else(|| config.jwt_secret.clone());

    let ttl = token_ttl(args.ttl_hours)?;

    if let Some(title) = args.create_video.as_deref() {
        info!("🔌 Connecting to database...");
        let db = database::setup_database(&config).await?;
        let video = VideoService::new(db)
            .create_video(&args.user, title, None)
            .await?;
        info!("🎬 Created video {} owned by {}", video.id, video.user_id);
        println!("video_id={}", video.id);
    }

    let token = create_jwt(&args.user, &secret, ttl)?;
    info!("🔐 Minted token for {} valid {}h", args.user, args.ttl_hours);
    println!("{}", token);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ttl_bounds() {
        assert_eq!(token_ttl(24).unwrap(), chrono::Duration::hours(24));
        assert!(token_ttl(0).is_err());
        assert!(token_ttl(-5).is_err());
        assert!(token_ttl(i64::MAX).is_err());
    }

    #[test]
    fn test_far_future_ttl_fails_at_signing() {
        // Fits a Duration but not a timestamp
        let ttl = token_ttl(i64::MAX / 3_600_000).unwrap();
        assert!(create_jwt("user-1", "secret", ttl).is_err());
    }
}
