use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chapter {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub position: i64,
    pub is_freemium: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Text,
    Video,
    Quiz,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: i64,
    pub chapter_id: i64,
    pub title: String,
    pub position: i64,
    pub kind: LessonKind,
}

pub async fn course_exists(database: &SqlitePool, course_id: i64) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM course WHERE id = ?)")
        .bind(course_id)
        .fetch_one(database)
        .await?;
    Ok(exists)
}

pub async fn get_course(database: &SqlitePool, course_id: i64) -> Result<Option<Course>> {
    let course = sqlx::query_as::<_, Course>("SELECT id, title FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(database)
        .await?;
    Ok(course)
}

pub async fn get_chapters(database: &SqlitePool, course_id: i64) -> Result<Vec<Chapter>> {
    let chapters = sqlx::query_as::<_, Chapter>(
        "SELECT id, course_id, title, position, is_freemium FROM chapter
         WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?;
    Ok(chapters)
}

pub async fn get_lessons(database: &SqlitePool, chapter_id: i64) -> Result<Vec<Lesson>> {
    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT id, chapter_id, title, position, kind FROM lesson
         WHERE chapter_id = ? ORDER BY position",
    )
    .bind(chapter_id)
    .fetch_all(database)
    .await?;
    Ok(lessons)
}

pub async fn create_course(database: &SqlitePool, title: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO course (title) VALUES (?)")
        .bind(title)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn add_chapter(
    database: &SqlitePool,
    course_id: i64,
    title: &str,
    position: i64,
    is_freemium: bool,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO chapter (course_id, title, position, is_freemium) VALUES (?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(title)
    .bind(position)
    .bind(is_freemium)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn add_lesson(
    database: &SqlitePool,
    chapter_id: i64,
    title: &str,
    position: i64,
    kind: LessonKind,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO lesson (chapter_id, title, position, kind) VALUES (?, ?, ?, ?)")
            .bind(chapter_id)
            .bind(title)
            .bind(position)
            .bind(kind)
            .execute(database)
            .await?;
    Ok(result.last_insert_rowid())
}
