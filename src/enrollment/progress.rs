use sqlx::SqliteConnection;

use crate::error::Result;

/// Create the per-chapter and per-lesson progress rows for a student on a
/// course, on the caller's transaction. Inserts are conflict-ignoring, so the
/// call is idempotent and safe under concurrent retries of the same enroll.
///
/// Returns whether the student had already completed any lesson of this
/// course before this call (freemium browsing happens without an enrollment,
/// and the conversion funnel needs to know about it). The check runs before
/// the inserts.
pub async fn ensure_course_progress(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
) -> Result<bool> {
    let had_completed_lessons = had_completed_lessons(conn, course_id, student_id).await?;

    sqlx::query(
        "INSERT INTO chapter_progress (student_id, chapter_id, completed_lesson_item_count)
         SELECT ?, id, 0 FROM chapter WHERE course_id = ?
         ON CONFLICT (student_id, chapter_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    // quiz_score starts at 0 only for quiz lessons, other kinds carry none
    sqlx::query(
        "INSERT INTO lesson_progress (student_id, lesson_id, completed_question_count, quiz_score)
         SELECT ?, lesson.id, 0, CASE WHEN lesson.kind = 'quiz' THEN 0 ELSE NULL END
         FROM lesson JOIN chapter ON lesson.chapter_id = chapter.id
         WHERE chapter.course_id = ?
         ON CONFLICT (student_id, lesson_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    Ok(had_completed_lessons)
}

async fn had_completed_lessons(
    conn: &mut SqliteConnection,
    course_id: i64,
    student_id: i64,
) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(
             SELECT 1 FROM lesson_progress
             JOIN lesson ON lesson_progress.lesson_id = lesson.id
             JOIN chapter ON lesson.chapter_id = chapter.id
             WHERE lesson_progress.student_id = ?
               AND chapter.course_id = ?
               AND lesson_progress.completed_at IS NOT NULL)",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}
