use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::enrollment::{
    Enrollment, activate_enrollment, deactivate_enrollment, ensure_course, fallback_group,
    get_enrollment, progress, reassign_group,
};
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventPublisher};
use crate::utils::now_utc;

/// Group-to-course linking and the enrollment reconciliation it implies.
/// Every member of a linked group holds access to the course; unlinking
/// re-derives who keeps it through another group and who loses it.
pub struct GroupEnrollmentService {
    database: SqlitePool,
    publisher: Arc<dyn EventPublisher>,
}

impl GroupEnrollmentService {
    pub fn new(database: SqlitePool, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            database,
            publisher,
        }
    }

    /// Link groups to a course and enroll their current student members.
    /// Already-linked groups are a no-op, not an error. Returns the ids of
    /// the newly linked groups.
    pub async fn enroll_groups(
        &self,
        course_id: i64,
        group_ids: &[i64],
        actor: Option<i64>,
    ) -> Result<Vec<i64>> {
        let mut tx = self.database.begin().await?;
        ensure_course(&mut tx, course_id).await?;

        let mut new_groups = Vec::new();
        let mut any_exists = false;
        for &group_id in group_ids {
            if !group_exists(&mut tx, group_id).await? {
                continue;
            }
            any_exists = true;
            if !link_exists(&mut tx, course_id, group_id).await? {
                new_groups.push(group_id);
            }
        }
        if !any_exists {
            return Err(Error::GroupNotFound(group_ids.to_vec()));
        }

        for &group_id in &new_groups {
            sqlx::query(
                "INSERT INTO group_course_link (group_id, course_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(group_id)
            .bind(course_id)
            .bind(now_utc())
            .execute(&mut *tx)
            .await?;

            for student_id in student_members(&mut tx, group_id).await? {
                let existing = get_enrollment(&mut tx, course_id, student_id).await?;
                if existing.as_ref().is_some_and(Enrollment::is_enrolled) {
                    continue;
                }
                activate_enrollment(&mut tx, course_id, student_id, Some(group_id), None).await?;
                progress::ensure_course_progress(&mut tx, course_id, student_id).await?;
            }
        }
        tx.commit().await?;

        info!(
            "linked {} groups to course {course_id}",
            new_groups.len()
        );
        for &group_id in &new_groups {
            self.publisher.publish(DomainEvent::GroupEnrolled {
                course_id,
                group_id,
                actor,
            });
        }
        Ok(new_groups)
    }

    /// Unlink groups from a course. Enrollments attributed to a removed group
    /// are re-pointed to the earliest-created membership in a group still
    /// linked, or flipped to not-enrolled when none remains. Direct
    /// enrollments are untouched.
    pub async fn unenroll_groups(&self, course_id: i64, group_ids: &[i64]) -> Result<()> {
        let mut tx = self.database.begin().await?;

        let mut removed = Vec::new();
        for &group_id in group_ids {
            if link_exists(&mut tx, course_id, group_id).await? {
                removed.push(group_id);
            }
        }
        if removed.is_empty() {
            return Err(Error::GroupLinkNotFound {
                course_id,
                group_ids: group_ids.to_vec(),
            });
        }

        let mut attributed = Vec::new();
        for &group_id in &removed {
            sqlx::query("DELETE FROM group_course_link WHERE group_id = ? AND course_id = ?")
                .bind(group_id)
                .bind(course_id)
                .execute(&mut *tx)
                .await?;
            let students = sqlx::query_scalar::<_, i64>(
                "SELECT student_id FROM enrollment
                 WHERE course_id = ? AND enrolled_by_group_id = ? AND status = 'enrolled'",
            )
            .bind(course_id)
            .bind(group_id)
            .fetch_all(&mut *tx)
            .await?;
            attributed.extend(students);
        }

        // read the remaining links inside the same transaction as the delete
        for student_id in attributed {
            match fallback_group(&mut tx, course_id, student_id, None).await? {
                Some(group_id) => reassign_group(&mut tx, course_id, student_id, group_id).await?,
                None => deactivate_enrollment(&mut tx, course_id, student_id).await?,
            }
        }
        tx.commit().await?;
        info!(
            "unlinked {} groups from course {course_id}",
            removed.len()
        );
        Ok(())
    }
}

async fn group_exists(conn: &mut SqliteConnection, group_id: i64) -> Result<bool> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM student_group WHERE id = ?)")
            .bind(group_id)
            .fetch_one(conn)
            .await?;
    Ok(exists)
}

async fn link_exists(conn: &mut SqliteConnection, course_id: i64, group_id: i64) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM group_course_link WHERE group_id = ? AND course_id = ?)",
    )
    .bind(group_id)
    .bind(course_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Active student members of a group, earliest membership first.
async fn student_members(conn: &mut SqliteConnection, group_id: i64) -> Result<Vec<i64>> {
    let members = sqlx::query_scalar::<_, i64>(
        "SELECT group_membership.student_id
         FROM group_membership
         JOIN user ON user.id = group_membership.student_id
         WHERE group_membership.group_id = ?
           AND user.role = 'student' AND user.deleted_at IS NULL
         ORDER BY group_membership.created_at",
    )
    .bind(group_id)
    .fetch_all(conn)
    .await?;
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::EnrollmentStatus;
    use crate::error::ErrorKind;
    use crate::fixtures;

    #[tokio::test]
    async fn linking_groups_enrolls_their_members() {
        let pool = fixtures::pool().await;
        let (service, publisher) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[2, 1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let bob = fixtures::student(&pool, "bob").await;
        let group = fixtures::group_with_member(&pool, "g", ada, 1).await;
        crate::directory::add_member(&pool, group, bob).await.unwrap();

        let linked = service.enroll_groups(course.id, &[group], Some(5)).await.unwrap();
        assert_eq!(linked, vec![group]);

        for student in [ada, bob] {
            let mut conn = pool.acquire().await.unwrap();
            let enrollment = get_enrollment(&mut conn, course.id, student)
                .await
                .unwrap()
                .unwrap();
            assert!(enrollment.is_enrolled());
            assert_eq!(enrollment.enrolled_by_group_id, Some(group));
        }
        assert_eq!(
            publisher.take(),
            vec![DomainEvent::GroupEnrolled {
                course_id: course.id,
                group_id: group,
                actor: Some(5),
            }]
        );
    }

    #[tokio::test]
    async fn relinking_an_already_linked_group_is_a_no_op() {
        let pool = fixtures::pool().await;
        let (service, publisher) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let group = fixtures::group_with_member(&pool, "g", ada, 1).await;

        service.enroll_groups(course.id, &[group], None).await.unwrap();
        publisher.take();

        let linked = service.enroll_groups(course.id, &[group], None).await.unwrap();
        assert!(linked.is_empty());
        assert!(publisher.take().is_empty());
    }

    #[tokio::test]
    async fn linking_unknown_groups_is_not_found() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;

        let err = service
            .enroll_groups(course.id, &[404, 405], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn linking_does_not_touch_directly_enrolled_students() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let (enrollment_service, _) = fixtures::enrollment_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let group = fixtures::group_with_member(&pool, "g", ada, 1).await;

        enrollment_service
            .enroll_student(course.id, ada, None, None)
            .await
            .unwrap();
        service.enroll_groups(course.id, &[group], None).await.unwrap();

        let enrollment = enrollment_service
            .get_enrollment(course.id, ada)
            .await
            .unwrap()
            .unwrap();
        // direct enrollment keeps its attribution
        assert_eq!(enrollment.enrolled_by_group_id, None);
    }

    #[tokio::test]
    async fn unlinking_repoints_to_remaining_group_by_membership_age() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        // membership in a predates membership in b
        let group_a = fixtures::group_with_member(&pool, "a", ada, 1).await;
        let group_b = fixtures::group_with_member(&pool, "b", ada, 2).await;
        service
            .enroll_groups(course.id, &[group_a, group_b], None)
            .await
            .unwrap();

        service.unenroll_groups(course.id, &[group_a]).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let enrollment = get_enrollment(&mut conn, course.id, ada)
            .await
            .unwrap()
            .unwrap();
        assert!(enrollment.is_enrolled());
        assert_eq!(enrollment.enrolled_by_group_id, Some(group_b));
    }

    #[tokio::test]
    async fn unlinking_the_only_group_unenrolls_the_student() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let group = fixtures::group_with_member(&pool, "g", ada, 1).await;
        service.enroll_groups(course.id, &[group], None).await.unwrap();

        service.unenroll_groups(course.id, &[group]).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let enrollment = get_enrollment(&mut conn, course.id, ada)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::NotEnrolled);
        assert_eq!(enrollment.enrolled_at, None);
        assert_eq!(enrollment.enrolled_by_group_id, None);
    }

    #[tokio::test]
    async fn unlinking_leaves_direct_enrollments_alone() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let (enrollment_service, _) = fixtures::enrollment_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let bob = fixtures::student(&pool, "bob").await;
        let group = fixtures::group_with_member(&pool, "g", bob, 1).await;
        enrollment_service
            .enroll_student(course.id, ada, None, None)
            .await
            .unwrap();
        service.enroll_groups(course.id, &[group], None).await.unwrap();

        service.unenroll_groups(course.id, &[group]).await.unwrap();

        let enrollment = enrollment_service
            .get_enrollment(course.id, ada)
            .await
            .unwrap()
            .unwrap();
        assert!(enrollment.is_enrolled());
    }

    #[tokio::test]
    async fn unlinking_without_any_link_is_not_found() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[1]).await;
        let group = crate::directory::create_group(&pool, "g").await.unwrap();

        let err = service
            .unenroll_groups(course.id, &[group])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn group_enrollment_creates_progress_rows_once() {
        let pool = fixtures::pool().await;
        let (service, _) = fixtures::group_service(&pool);
        let course = fixtures::course_with_chapters(&pool, &[3, 2]).await;
        let ada = fixtures::student(&pool, "ada").await;
        let group_a = fixtures::group_with_member(&pool, "a", ada, 1).await;
        let group_b = fixtures::group_with_member(&pool, "b", ada, 2).await;

        service.enroll_groups(course.id, &[group_a], None).await.unwrap();
        service.enroll_groups(course.id, &[group_b], None).await.unwrap();

        let lessons = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM lesson_progress WHERE student_id = ?",
        )
        .bind(ada)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(lessons, 5);
    }
}
