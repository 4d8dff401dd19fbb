//! Seed helpers shared by the module test suites.

use std::sync::Arc;

use sqlx::SqlitePool;
use time::macros::datetime;

use crate::catalog::{self, Course, LessonKind};
use crate::directory::{self, UserRole};
use crate::enrollment::EnrollmentService;
use crate::enrollment::groups::GroupEnrollmentService;
use crate::events::RecordingPublisher;
use crate::utils::now_utc;

pub async fn pool() -> SqlitePool {
    crate::db::open_in_memory().await.unwrap()
}

pub fn enrollment_service(pool: &SqlitePool) -> (EnrollmentService, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let service = EnrollmentService::new(pool.clone(), publisher.clone());
    (service, publisher)
}

pub fn group_service(pool: &SqlitePool) -> (GroupEnrollmentService, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let service = GroupEnrollmentService::new(pool.clone(), publisher.clone());
    (service, publisher)
}

pub async fn student(pool: &SqlitePool, name: &str) -> i64 {
    directory::create_user(pool, name, &format!("{name}@example.com"), UserRole::Student)
        .await
        .unwrap()
}

/// A course with one chapter per entry, each holding that many text lessons.
pub async fn course_with_chapters(pool: &SqlitePool, lessons_per_chapter: &[usize]) -> Course {
    let course_id = catalog::create_course(pool, "test course").await.unwrap();
    for (i, &lesson_count) in lessons_per_chapter.iter().enumerate() {
        let chapter_id = catalog::add_chapter(
            pool,
            course_id,
            &format!("chapter {}", i + 1),
            i as i64 + 1,
            false,
        )
        .await
        .unwrap();
        for j in 0..lesson_count {
            catalog::add_lesson(
                pool,
                chapter_id,
                &format!("lesson {}.{}", i + 1, j + 1),
                j as i64 + 1,
                LessonKind::Text,
            )
            .await
            .unwrap();
        }
    }
    catalog::get_course(pool, course_id).await.unwrap().unwrap()
}

/// One freemium chapter with a text lesson followed by a quiz lesson.
pub async fn course_with_quiz(pool: &SqlitePool) -> Course {
    let course_id = catalog::create_course(pool, "quiz course").await.unwrap();
    let chapter_id = catalog::add_chapter(pool, course_id, "intro", 1, true)
        .await
        .unwrap();
    catalog::add_lesson(pool, chapter_id, "reading", 1, LessonKind::Text)
        .await
        .unwrap();
    catalog::add_lesson(pool, chapter_id, "checkpoint", 2, LessonKind::Quiz)
        .await
        .unwrap();
    catalog::get_course(pool, course_id).await.unwrap().unwrap()
}

/// Group with one member; `order` fixes the membership creation time so that
/// tests can rely on the earliest-membership tie-break.
pub async fn group_with_member(
    pool: &SqlitePool,
    name: &str,
    student_id: i64,
    order: i64,
) -> i64 {
    let group_id = directory::create_group(pool, name).await.unwrap();
    join_group_at(pool, group_id, student_id, order).await;
    group_id
}

pub async fn join_group_at(pool: &SqlitePool, group_id: i64, student_id: i64, order: i64) {
    let created_at = datetime!(2026-01-01 00:00 UTC) + time::Duration::minutes(order);
    directory::add_member_at(pool, group_id, student_id, created_at)
        .await
        .unwrap();
}

/// Mark the first lesson of the course completed for the student, creating
/// the progress row if freemium browsing has not yet. Mirrors what the lesson
/// completion path outside this engine does.
pub async fn complete_first_lesson(pool: &SqlitePool, course_id: i64, student_id: i64) {
    let lesson_id = sqlx::query_scalar::<_, i64>(
        "SELECT lesson.id FROM lesson JOIN chapter ON lesson.chapter_id = chapter.id
         WHERE chapter.course_id = ? ORDER BY chapter.position, lesson.position LIMIT 1",
    )
    .bind(course_id)
    .fetch_one(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO lesson_progress (student_id, lesson_id, completed_question_count, completed_at)
         VALUES (?, ?, 0, ?)
         ON CONFLICT (student_id, lesson_id) DO UPDATE SET completed_at = excluded.completed_at",
    )
    .bind(student_id)
    .bind(lesson_id)
    .bind(now_utc())
    .execute(pool)
    .await
    .unwrap();
}
