/// Failure class a transport layer can map to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("course {0} not found")]
    CourseNotFound(i64),
    #[error("student {0} not found or deleted")]
    StudentNotFound(i64),
    #[error("none of the groups {0:?} exist")]
    GroupNotFound(Vec<i64>),
    #[error("no group-course link found for course {course_id} among groups {group_ids:?}")]
    GroupLinkNotFound { course_id: i64, group_ids: Vec<i64> },
    #[error("students already enrolled: {student_ids:?}")]
    AlreadyEnrolled { student_ids: Vec<i64> },
    #[error("student id list is empty")]
    EmptyStudentList,
    #[error("unknown or deleted students: {student_ids:?}")]
    UnknownStudents { student_ids: Vec<i64> },
    #[error("{count} of the requested students are not enrolled")]
    NotEnrolled { count: usize },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CourseNotFound(_)
            | Error::StudentNotFound(_)
            | Error::GroupNotFound(_)
            | Error::GroupLinkNotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyEnrolled { .. } => ErrorKind::Conflict,
            Error::EmptyStudentList | Error::UnknownStudents { .. } | Error::NotEnrolled { .. } => {
                ErrorKind::BadRequest
            }
            Error::Database(_) | Error::Migrate(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
