/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Calendar date of a stay (check-in / check-out), no time zone.
pub type StayDate = chrono::NaiveDate;
