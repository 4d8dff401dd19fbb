pub mod groups;
pub mod progress;
pub mod stats;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventPublisher};
use crate::utils::now_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    NotEnrolled,
}

/// One row per student and course. Rows are never deleted while progress data
/// references them, unenroll flips the status instead.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    pub enrolled_at: Option<OffsetDateTime>,
    pub enrolled_by_group_id: Option<i64>,
    pub payment_id: Option<String>,
    pub completed_at: Option<OffsetDateTime>,
}

impl Enrollment {
    pub fn is_enrolled(&self) -> bool {
        self.status == EnrollmentStatus::Enrolled
    }
}

/// Direct enroll/unenroll for individual and bulk students. Group-derived
/// enrollment goes through [`groups::GroupEnrollmentService`], which reuses
/// the pub(crate) primitives below.
pub struct EnrollmentService {
    database: SqlitePool,
    publisher: Arc<dyn EventPublisher>,
}

impl EnrollmentService {
    pub fn new(database: SqlitePool, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            database,
            publisher,
        }
    }

    /// Enroll one student. The enrollment upsert, progress-row creation and
    /// (for a first-ever enrollment) funnel counting share one transaction;
    /// the event goes out only after commit.
    pub async fn enroll_student(
        &self,
        course_id: i64,
        student_id: i64,
        payment_id: Option<String>,
        actor: Option<i64>,
    ) -> Result<()> {
        let mut tx = self.database.begin().await?;
        ensure_course(&mut tx, course_id).await?;
        ensure_active_student(&mut tx, student_id).await?;

        let existing = get_enrollment(&mut tx, course_id, student_id).await?;
        if existing.as_ref().is_some_and(Enrollment::is_enrolled) {
            return Err(Error::AlreadyEnrolled {
                student_ids: vec![student_id],
            });
        }
        let first_time = existing.is_none();

        activate_enrollment(&mut tx, course_id, student_id, None, payment_id.as_deref()).await?;
        let had_freemium_progress =
            progress::ensure_course_progress(&mut tx, course_id, student_id).await?;
        if first_time {
            stats::record_first_enrollment(
                &mut tx,
                course_id,
                payment_id.as_deref(),
                had_freemium_progress,
            )
            .await?;
        }
        tx.commit().await?;

        info!("student {student_id} enrolled in course {course_id}");
        self.publisher.publish(DomainEvent::EnrollmentCreated {
            course_id,
            student_id,
            actor,
        });
        Ok(())
    }

    /// Enroll many students at once, all-or-nothing. Unknown or deleted ids
    /// fail the call up front, as does any student already enrolled. Bulk
    /// assignment is administrative, so it never touches the funnel counters.
    pub async fn enroll_students(
        &self,
        course_id: i64,
        student_ids: &[i64],
        actor: Option<i64>,
    ) -> Result<()> {
        if student_ids.is_empty() {
            return Err(Error::EmptyStudentList);
        }
        let mut tx = self.database.begin().await?;
        ensure_course(&mut tx, course_id).await?;

        let mut unknown = Vec::new();
        for &student_id in student_ids {
            if !is_active_student(&mut tx, student_id).await? {
                unknown.push(student_id);
            }
        }
        if !unknown.is_empty() {
            return Err(Error::UnknownStudents {
                student_ids: unknown,
            });
        }

        let mut already_enrolled = Vec::new();
        for &student_id in student_ids {
            let existing = get_enrollment(&mut tx, course_id, student_id).await?;
            if existing.as_ref().is_some_and(Enrollment::is_enrolled) {
                already_enrolled.push(student_id);
            }
        }
        if !already_enrolled.is_empty() {
            return Err(Error::AlreadyEnrolled {
                student_ids: already_enrolled,
            });
        }

        for &student_id in student_ids {
            activate_enrollment(&mut tx, course_id, student_id, None, None).await?;
            progress::ensure_course_progress(&mut tx, course_id, student_id).await?;
        }
        tx.commit().await?;

        info!(
            "assigned {} students to course {course_id}",
            student_ids.len()
        );
        self.publisher.publish(DomainEvent::UsersAssigned {
            course_id,
            student_ids: student_ids.to_vec(),
            actor,
        });
        for &student_id in student_ids {
            self.publisher.publish(DomainEvent::EnrollmentCreated {
                course_id,
                student_id,
                actor,
            });
        }
        Ok(())
    }

    /// Direct unenroll. Group-derived enrollments are never dropped blindly:
    /// when the student reaches the course through another linked group the
    /// enrollment is re-pointed to the earliest-created such membership
    /// instead of removed.
    pub async fn unenroll_students(&self, course_id: i64, student_ids: &[i64]) -> Result<()> {
        if student_ids.is_empty() {
            return Err(Error::EmptyStudentList);
        }
        let mut tx = self.database.begin().await?;

        let mut enrolled = Vec::new();
        for &student_id in student_ids {
            if let Some(enrollment) = get_enrollment(&mut tx, course_id, student_id).await? {
                if enrollment.is_enrolled() {
                    enrolled.push(enrollment);
                }
            }
        }
        if student_ids.len() > enrolled.len() {
            return Err(Error::NotEnrolled {
                count: student_ids.len() - enrolled.len(),
            });
        }

        for enrollment in enrolled {
            match enrollment.enrolled_by_group_id {
                None => deactivate_enrollment(&mut tx, course_id, enrollment.student_id).await?,
                Some(current_group) => {
                    let fallback = fallback_group(
                        &mut tx,
                        course_id,
                        enrollment.student_id,
                        Some(current_group),
                    )
                    .await?;
                    match fallback {
                        Some(group_id) => {
                            reassign_group(&mut tx, course_id, enrollment.student_id, group_id)
                                .await?;
                        }
                        None => {
                            deactivate_enrollment(&mut tx, course_id, enrollment.student_id)
                                .await?;
                        }
                    }
                }
            }
        }
        tx.commit().await?;
        info!(
            "unenrolled {} students from course {course_id}",
            student_ids.len()
        );
        Ok(())
    }

    pub async fn get_enrollment(
        &self,
        course_id: i64,
        student_id: i64,
    ) -> Result<Option<Enrollment>> {
        let mut conn = self.database.acquire().await?;
        get_enrollment(&mut conn, course_id, student_id).await
    }
}

pub(crate) async fn ensure_course(conn: &mut SqliteConnection, course_id: i64) -> Result<()> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM course WHERE id = ?)")
        .bind(course_id)
        .fetch_one(conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(Error::CourseNotFound(course_id))
    }
}

pub(crate) async fn is_active_student(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<bool> {
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM user WHERE id = ? AND role = 'student' AND deleted_at IS NULL)",
    )
    .bind(student_id)
    .fetch_one(conn)
    .await?;
    Ok(active)
}

async fn ensure_active_student(conn: &mut SqliteConnection, student_id: i64) -> Result<()> {
    if is_active_student(conn, student_id).await? {
        Ok(())
    } else {
        Err(Error::StudentNotFound(student_id))
    }
}

pub(crate) async fn get_enrollment(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
) -> Result<Option<Enrollment>> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT id, student_id, course_id, status, enrolled_at, enrolled_by_group_id,
                payment_id, completed_at
         FROM enrollment WHERE course_id = ? AND student_id = ?",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_optional(conn)
    .await?;
    Ok(enrollment)
}

/// Create or re-activate an enrollment row. The conflict arm makes re-enroll
/// a plain flip back to enrolled, progress rows from the previous cycle stay
/// untouched.
pub(crate) async fn activate_enrollment(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
    enrolled_by_group_id: Option<i64>,
    payment_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO enrollment
             (student_id, course_id, status, enrolled_at, enrolled_by_group_id, payment_id)
         VALUES (?, ?, 'enrolled', ?, ?, ?)
         ON CONFLICT (student_id, course_id) DO UPDATE SET
             status = 'enrolled',
             enrolled_at = excluded.enrolled_at,
             enrolled_by_group_id = excluded.enrolled_by_group_id,
             payment_id = excluded.payment_id",
    )
    .bind(student_id)
    .bind(course_id)
    .bind(now_utc())
    .bind(enrolled_by_group_id)
    .bind(payment_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn deactivate_enrollment(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE enrollment SET status = 'not_enrolled', enrolled_at = NULL,
                enrolled_by_group_id = NULL
         WHERE course_id = ? AND student_id = ?",
    )
    .bind(course_id)
    .bind(student_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn reassign_group(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
    group_id: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE enrollment SET enrolled_by_group_id = ?
         WHERE course_id = ? AND student_id = ?",
    )
    .bind(group_id)
    .bind(course_id)
    .bind(student_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Earliest-created membership of the student in a group currently linked to
/// the course, skipping `exclude`. Membership creation order is the explicit
/// tie-break when several groups grant the same access.
pub(crate) async fn fallback_group(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
    exclude: Option<i64>,
) -> Result<Option<i64>> {
    let candidates = sqlx::query_scalar::<_, i64>(
        "SELECT group_membership.group_id
         FROM group_membership
         JOIN group_course_link ON group_course_link.group_id = group_membership.group_id
         WHERE group_course_link.course_id = ? AND group_membership.student_id = ?
         ORDER BY group_membership.created_at",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_all(conn)
    .await?;
    Ok(candidates.into_iter().find(|&g| Some(g) != exclude))
}
