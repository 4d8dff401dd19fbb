use sqlx::SqliteConnection;

use crate::error::Result;

/// Conversion-funnel bucket for a first-ever enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunnelBucket {
    Free,
    Paid,
    PaidAfterFreemium,
}

pub fn classify(payment_id: Option<&str>, had_freemium_progress: bool) -> FunnelBucket {
    match (payment_id, had_freemium_progress) {
        (None, _) => FunnelBucket::Free,
        (Some(_), false) => FunnelBucket::Paid,
        (Some(_), true) => FunnelBucket::PaidAfterFreemium,
    }
}

/// Bump the course summary counter for a first-ever enrollment row. Callers
/// only invoke this when no enrollment row existed before the current
/// transaction, which keeps each (student, course) pair counted once.
pub async fn record_first_enrollment(
    conn: &mut SqliteConnection,
    course_id: i64,
    payment_id: Option<&str>,
    had_freemium_progress: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO course_summary_stats (course_id) VALUES (?)
         ON CONFLICT (course_id) DO NOTHING",
    )
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    let column = match classify(payment_id, had_freemium_progress) {
        FunnelBucket::Free => "free_purchased_count",
        FunnelBucket::Paid => "paid_purchased_count",
        FunnelBucket::PaidAfterFreemium => "paid_purchased_after_freemium_count",
    };
    let sql = format!(
        "UPDATE course_summary_stats SET {column} = {column} + 1 WHERE course_id = ?"
    );
    sqlx::query(&sql).bind(course_id).execute(conn).await?;
    Ok(())
}

/// Counter snapshot for assertions and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct CourseSummaryStats {
    pub free_purchased_count: i64,
    pub paid_purchased_count: i64,
    pub paid_purchased_after_freemium_count: i64,
}

pub async fn get_summary(
    database: &sqlx::SqlitePool,
    course_id: i64,
) -> Result<CourseSummaryStats> {
    let stats = sqlx::query_as::<_, CourseSummaryStats>(
        "SELECT free_purchased_count, paid_purchased_count, paid_purchased_after_freemium_count
         FROM course_summary_stats WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_optional(database)
    .await?;
    Ok(stats.unwrap_or_default())
}
