use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::error::Result;
use crate::utils::now_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

pub async fn create_user(
    database: &SqlitePool,
    name: &str,
    email: &str,
    role: UserRole,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO user (name, email, role) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(role)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Soft delete, the row stays for progress and enrollment references.
pub async fn delete_user(database: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE user SET deleted_at = ? WHERE id = ?")
        .bind(now_utc())
        .bind(id)
        .execute(database)
        .await?;
    Ok(())
}

pub async fn is_active_student(database: &SqlitePool, id: i64) -> Result<bool> {
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM user WHERE id = ? AND role = 'student' AND deleted_at IS NULL)",
    )
    .bind(id)
    .fetch_one(database)
    .await?;
    Ok(active)
}

pub async fn get_user_list(database: &SqlitePool) -> Result<Vec<UserInfo>> {
    let users = sqlx::query_as::<_, UserInfo>(
        "SELECT id, name, email, role FROM user WHERE deleted_at IS NULL",
    )
    .fetch_all(database)
    .await?;
    Ok(users)
}

pub async fn create_group(database: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO student_group (name) VALUES (?)")
        .bind(name)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn add_member(database: &SqlitePool, group_id: i64, student_id: i64) -> Result<()> {
    add_member_at(database, group_id, student_id, now_utc()).await
}

/// Membership insert with an explicit creation time. The creation time is the
/// tie-break when a student holds access to a course through several groups,
/// so callers that replay history must be able to set it.
pub async fn add_member_at(
    database: &SqlitePool,
    group_id: i64,
    student_id: i64,
    created_at: OffsetDateTime,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_membership (student_id, group_id, created_at) VALUES (?, ?, ?)
         ON CONFLICT (student_id, group_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(group_id)
    .bind(created_at)
    .execute(database)
    .await?;
    Ok(())
}

pub async fn remove_member(database: &SqlitePool, group_id: i64, student_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM group_membership WHERE student_id = ? AND group_id = ?")
        .bind(student_id)
        .bind(group_id)
        .execute(database)
        .await?;
    Ok(())
}

pub async fn members_of(database: &SqlitePool, group_id: i64) -> Result<Vec<i64>> {
    let members = sqlx::query_scalar::<_, i64>(
        "SELECT student_id FROM group_membership WHERE group_id = ? ORDER BY created_at",
    )
    .bind(group_id)
    .fetch_all(database)
    .await?;
    Ok(members)
}

pub async fn groups_linked_to_course(database: &SqlitePool, course_id: i64) -> Result<Vec<i64>> {
    let groups = sqlx::query_scalar::<_, i64>(
        "SELECT group_id FROM group_course_link WHERE course_id = ? ORDER BY created_at",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?;
    Ok(groups)
}
