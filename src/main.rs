use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use course_server::catalog::{self, LessonKind};
use course_server::config::Config;
use course_server::directory::{self, UserRole};
use course_server::enrollment::stats;
use course_server::utils::init_log;
use course_server::{ChannelPublisher, EnrollmentService, GroupEnrollmentService};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to database file, overrides COURSE_DATABASE
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Log directory, overrides COURSE_LOG_DIR, stdout if neither is set
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Seed a small catalog in memory and run an enrollment walkthrough
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env();
    let _guard = init_log(args.log.or(config.log_dir));

    let database = if args.demo {
        course_server::db::open_in_memory().await?
    } else {
        let path = args.database.unwrap_or(config.database_path);
        course_server::db::open(&path).await?
    };
    info!("database ready");

    if args.demo {
        run_demo(database).await?;
    }
    Ok(())
}

async fn run_demo(database: sqlx::SqlitePool) -> anyhow::Result<()> {
    let (publisher, mut events) = ChannelPublisher::new();
    let publisher = Arc::new(publisher);
    let enrollment = EnrollmentService::new(database.clone(), publisher.clone());
    let groups = GroupEnrollmentService::new(database.clone(), publisher);

    let course_id = catalog::create_course(&database, "Rust for Rustaceans").await?;
    let intro = catalog::add_chapter(&database, course_id, "Foundations", 1, true).await?;
    catalog::add_lesson(&database, intro, "Types", 1, LessonKind::Text).await?;
    catalog::add_lesson(&database, intro, "Checkpoint", 2, LessonKind::Quiz).await?;

    let ada = directory::create_user(&database, "ada", "ada@example.com", UserRole::Student).await?;
    let bob = directory::create_user(&database, "bob", "bob@example.com", UserRole::Student).await?;
    let cohort = directory::create_group(&database, "cohort 1").await?;
    directory::add_member(&database, cohort, bob).await?;

    enrollment
        .enroll_student(course_id, ada, Some("pay_demo".into()), None)
        .await?;
    groups.enroll_groups(course_id, &[cohort], None).await?;

    while let Ok(event) = events.try_recv() {
        info!("event: {}", serde_json::to_string(&event)?);
    }
    let summary = stats::get_summary(&database, course_id).await?;
    info!("course summary: {summary:?}");
    Ok(())
}
