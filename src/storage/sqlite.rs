//! SQLite-backed [`Storage`].
//!
//! A single connection sits behind a mutex. Calls are short and never hold
//! the lock across an await point. Payment completion runs inside a
//! `BEGIN IMMEDIATE` transaction so two concurrent completions of the same
//! order serialize on the write lock and the second one sees `completed`.

use super::{Completion, OfflinePayment, Storage};
use crate::domain::catalog::{Batch, BatchInput, Course, CourseInput, FeeStructure, TestSeries, TestSeriesInput};
use crate::domain::coupon::{Coupon, CouponInput};
use crate::domain::enrollment::{BatchPurchaseOrder, Enrollment};
use crate::domain::live_class::{Attendance, AttendanceEntry, ClassStatus, LiveClass, NewLiveClass, RecordingUpdate};
use crate::domain::notification::{Device, NotificationRequest, NotificationView, PushNotification};
use crate::domain::payment::{
    ContentType, DeliveryStatus, NewTransaction, PaymentStatus, PhysicalProductOrder, ProductOrderSummary,
    PurchaseTarget, Transaction, TransactionSummary,
};
use crate::domain::pricing::FeeBreakdown;
use crate::domain::user::{NewUser, OtpChallenge, User};
use crate::error::{ClassroomError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const MIGRATION_SQL: &str = include_str!("../../migrations/001_initial.sql");

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) a database file and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let storage = Self { conn: Mutex::new(conn) };
        storage.run_migrations()?;
        info!("Opened database at {}", path.display());
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        self.conn()?.execute_batch(MIGRATION_SQL).map_err(|e| ClassroomError::Database {
            message: format!("Failed to run migrations: {e}"),
        })?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ClassroomError::Database {
            message: "database connection mutex poisoned".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Column codecs

/// Any `FromStr` value stored as TEXT (decimals, timestamps, enums).
struct Parsed<T>(T);

impl<T> FromSql for Parsed<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<T>()
            .map(Parsed)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// JSON document stored as TEXT.
struct Json<T>(T);

impl<T: DeserializeOwned> FromSql for Json<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?)
            .map(Json)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn parsed<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(row.get::<_, Parsed<T>>(col)?.0)
}

fn parsed_opt<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(row.get::<_, Option<Parsed<T>>>(col)?.map(|p| p.0))
}

fn json<T: DeserializeOwned>(row: &Row<'_>, col: &str) -> rusqlite::Result<T> {
    Ok(row.get::<_, Json<T>>(col)?.0)
}

fn json_opt<T: DeserializeOwned>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<T>> {
    Ok(row.get::<_, Option<Json<T>>>(col)?.map(|j| j.0))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Turn a unique-constraint failure into a conflict with a readable message.
fn conflict_or(e: rusqlite::Error, message: &str) -> ClassroomError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            ClassroomError::Conflict(message.to_string())
        }
        _ => e.into(),
    }
}

// ---------------------------------------------------------------------------
// Row mappers

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        full_name: row.get("full_name")?,
        role: parsed(row, "role")?,
        is_active: row.get("is_active")?,
        is_staff: row.get("is_staff")?,
        merit_user_id: row.get("merit_user_id")?,
        date_joined: parsed(row, "date_joined")?,
    })
}

fn otp_from_row(row: &Row<'_>) -> rusqlite::Result<OtpChallenge> {
    Ok(OtpChallenge {
        token: row.get("token")?,
        user_id: row.get("user_id")?,
        secret: row.get("secret")?,
        purpose: parsed(row, "purpose")?,
        expires_at: parsed(row, "expires_at")?,
        consumed: row.get("consumed")?,
    })
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        thumbnail: row.get("thumbnail")?,
        price: parsed_opt(row, "price")?,
        discount: parsed(row, "discount")?,
        effective_price: parsed_opt(row, "effective_price")?,
        validity_type: parsed(row, "validity_type")?,
        duration_value: row.get("duration_value")?,
        duration_unit: parsed(row, "duration_unit")?,
        expiry_date: parsed_opt(row, "expiry_date")?,
        is_published: row.get("is_published")?,
        is_featured: row.get("is_featured")?,
        tax_percent: row.get("tax_percent")?,
        internet_handling_charges: row.get("internet_handling_charges")?,
        created_by: row.get("created_by")?,
        created: parsed(row, "created")?,
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    Ok(Batch {
        id: row.get("id")?,
        name: row.get("name")?,
        batch_code: row.get("batch_code")?,
        start_date: parsed(row, "start_date")?,
        subject: row.get("subject")?,
        live_class_link: row.get("live_class_link")?,
        thumbnail: row.get("thumbnail")?,
        is_published: row.get("is_published")?,
        fee_structure: json_opt::<FeeStructure>(row, "fee_structure")?,
        created_by: row.get("created_by")?,
        created: parsed(row, "created")?,
    })
}

fn test_series_from_row(row: &Row<'_>) -> rusqlite::Result<TestSeries> {
    Ok(TestSeries {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        thumbnail: row.get("thumbnail")?,
        price: parsed(row, "price")?,
        discounted_price: parsed(row, "discounted_price")?,
        effective_price: parsed(row, "effective_price")?,
        is_digital: row.get("is_digital")?,
        url: row.get("url")?,
        highlights: json(row, "highlights")?,
        is_published: row.get("is_published")?,
        gst: row.get("gst")?,
        created_by: row.get("created_by")?,
        created: parsed(row, "created")?,
    })
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get("id")?,
        batch_id: row.get("batch_id")?,
        student_id: row.get("student_id")?,
        is_approved: row.get("is_approved")?,
        approved_by: row.get("approved_by")?,
        batch_joined_date: parsed_opt(row, "batch_joined_date")?,
        created: parsed(row, "created")?,
    })
}

fn batch_order_from_row(row: &Row<'_>) -> rusqlite::Result<BatchPurchaseOrder> {
    Ok(BatchPurchaseOrder {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        batch_id: row.get("batch_id")?,
        installment_number: row.get("installment_number")?,
        amount: parsed(row, "amount")?,
        is_paid: row.get("is_paid")?,
        payment_date: parsed_opt(row, "payment_date")?,
        transaction_id: row.get("transaction_id")?,
        reference_number: row.get("reference_number")?,
        created: parsed(row, "created")?,
    })
}

fn coupon_from_row(row: &Row<'_>) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        discount_type: parsed(row, "discount_type")?,
        discount_value: parsed(row, "discount_value")?,
        max_discount_amount: parsed_opt(row, "max_discount_amount")?,
        start_at: parsed(row, "start_at")?,
        end_at: parsed_opt(row, "end_at")?,
        lifetime: row.get("lifetime")?,
        min_order_value: parsed(row, "min_order_value")?,
        max_uses: row.get("max_uses")?,
        usage_per_student: row.get("usage_per_student")?,
        is_visible: row.get("is_visible")?,
        is_expired: row.get("is_expired")?,
        status: row.get("status")?,
        coupon_type: parsed(row, "coupon_type")?,
        students: json(row, "students")?,
        courses: json(row, "courses")?,
        is_all_courses: row.get("is_all_courses")?,
        total_applied: row.get("total_applied")?,
        created_by: row.get("created_by")?,
        created: parsed(row, "created")?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        content_type: parsed(row, "content_type")?,
        content_id: row.get("content_id")?,
        installment_number: row.get("installment_number")?,
        amount: parsed(row, "amount")?,
        transaction_id: row.get("transaction_id")?,
        payment_id: row.get("payment_id")?,
        payment_status: parsed(row, "payment_status")?,
        breakdown: FeeBreakdown {
            original_price: parsed(row, "original_price")?,
            discount_applied: parsed(row, "discount_applied")?,
            price_after_coupon: parsed(row, "price_after_coupon")?,
            gst_percentage: parsed(row, "gst_percentage")?,
            gst_amount: parsed(row, "gst_amount")?,
            internet_charges: parsed(row, "internet_charges")?,
            platform_fees: parsed(row, "platform_fees")?,
            total_amount: parsed(row, "total_amount")?,
        },
        coupon_id: row.get("coupon_id")?,
        created_at: parsed(row, "created_at")?,
        updated_at: parsed(row, "updated_at")?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionSummary> {
    Ok(TransactionSummary {
        transaction: transaction_from_row(row)?,
        content_name: row.get("content_name")?,
    })
}

fn product_order_from_row(row: &Row<'_>) -> rusqlite::Result<ProductOrderSummary> {
    Ok(ProductOrderSummary {
        order: PhysicalProductOrder {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            test_series_id: row.get("test_series_id")?,
            purchase_order_id: row.get("purchase_order_id")?,
            delivery_status: parsed(row, "delivery_status")?,
            order_date: parsed(row, "order_date")?,
        },
        test_series_name: row.get("test_series_name")?,
        student_name: row.get("full_name")?,
        phone_number: row.get("phone_number")?,
    })
}

const PRODUCT_ORDER_WITH_NAMES: &str = "SELECT p.*, ts.name AS test_series_name, u.full_name, u.phone_number
    FROM physical_product_orders p
    JOIN test_series ts ON ts.id = p.test_series_id
    JOIN users u ON u.id = p.user_id";

fn live_class_from_row(row: &Row<'_>) -> rusqlite::Result<LiveClass> {
    Ok(LiveClass {
        id: row.get("id")?,
        batch_id: row.get("batch_id")?,
        title: row.get("title")?,
        class_id: row.get("class_id")?,
        date: parsed(row, "date")?,
        status: parsed(row, "status")?,
        host_link: row.get("host_link")?,
        common_host_link: row.get("common_host_link")?,
        common_moderator_link: row.get("common_moderator_link")?,
        common_participant_link: row.get("common_participant_link")?,
        recording_url: row.get("recording_url")?,
        recording_status: row.get("recording_status")?,
        duration: row.get("duration")?,
        created: parsed(row, "created")?,
    })
}

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        live_class_id: row.get("live_class_id")?,
        attended: row.get("attended")?,
        analytics: json_opt(row, "analytics")?,
        browser: row.get("browser")?,
        ip: row.get("ip")?,
        os: row.get("os")?,
        start_time: row.get("start_time")?,
        total_time: row.get("total_time")?,
    })
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        registration_id: row.get("registration_id")?,
        active: row.get("active")?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<PushNotification> {
    Ok(PushNotification {
        id: row.get("id")?,
        title: row.get("title")?,
        message: row.get("message")?,
        criteria: parsed(row, "criteria")?,
        course_id: row.get("course_id")?,
        batch_id: row.get("batch_id")?,
        student_ids: json(row, "student_ids")?,
        sent_at: parsed(row, "sent_at")?,
        sender_id: row.get("sender_id")?,
    })
}

const TRANSACTION_WITH_NAME: &str = "SELECT t.*, CASE t.content_type
        WHEN 'course' THEN (SELECT name FROM courses WHERE id = t.content_id)
        WHEN 'batch' THEN (SELECT name FROM batches WHERE id = t.content_id)
        WHEN 'test_series' THEN (SELECT name FROM test_series WHERE id = t.content_id)
    END AS content_name
    FROM transactions t";

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Vec<T>>
where
    P: rusqlite::Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?.collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

fn query_one<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Option<T>>
where
    P: rusqlite::Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    Ok(conn.query_row(sql, params, f).optional()?)
}

fn content_exists(conn: &Connection, content_type: ContentType, content_id: i64) -> Result<bool> {
    let table = match content_type {
        ContentType::Course => "courses",
        ContentType::Batch => "batches",
        ContentType::TestSeries => "test_series",
    };
    Ok(conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        params![content_id],
        |row| row.get(0),
    )?)
}

/// Create the purchase order that grants access to what a transaction paid for.
///
/// Content deleted after checkout has nothing left to grant; the payment
/// still settles and no order is written.
fn create_purchase_order(conn: &Connection, record: &Transaction, now: &str) -> Result<()> {
    if !content_exists(conn, record.content_type, record.content_id)? {
        warn!(
            "{} {} paid by transaction {} no longer exists, skipping purchase order",
            record.content_type, record.content_id, record.id
        );
        return Ok(());
    }
    match record.target() {
        PurchaseTarget::Course(course_id) => {
            conn.execute(
                "INSERT INTO course_purchase_orders (student_id, course_id, transaction_id, created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.user_id, course_id, record.id, now],
            )?;
        }
        PurchaseTarget::Batch { batch_id, installment } => {
            conn.execute(
                "INSERT INTO batch_purchase_orders
                    (student_id, batch_id, installment_number, amount, is_paid, payment_date, transaction_id, created)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?5)
                 ON CONFLICT(student_id, batch_id, installment_number) DO UPDATE SET
                    amount = excluded.amount,
                    is_paid = 1,
                    payment_date = excluded.payment_date,
                    transaction_id = excluded.transaction_id",
                params![
                    record.user_id,
                    batch_id,
                    installment,
                    record.amount.to_string(),
                    now,
                    record.id
                ],
            )?;
        }
        PurchaseTarget::TestSeries(test_series_id) => {
            conn.execute(
                "INSERT INTO test_series_purchase_orders (student_id, test_series_id, transaction_id, created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.user_id, test_series_id, record.id, now],
            )?;
            let purchase_order_id = conn.last_insert_rowid();
            let is_digital: Option<bool> = conn
                .query_row(
                    "SELECT is_digital FROM test_series WHERE id = ?1",
                    params![test_series_id],
                    |row| row.get(0),
                )
                .optional()?;
            if is_digital == Some(false) {
                conn.execute(
                    "INSERT INTO physical_product_orders
                        (user_id, test_series_id, purchase_order_id, delivery_status, order_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.user_id,
                        test_series_id,
                        purchase_order_id,
                        DeliveryStatus::DeliveryPending.as_str(),
                        now
                    ],
                )?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (email, phone_number, full_name, role, is_active, is_staff, date_joined)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                user.email,
                user.phone_number,
                user.full_name,
                user.role.as_str(),
                user.is_staff,
                ts(Utc::now())
            ],
        )
        .map_err(|e| conflict_or(e, "A user with this email or phone number already exists."))?;
        let id = conn.last_insert_rowid();
        debug!("Created user {} with id {}", user.email, id);
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
            .map_err(Into::into)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        query_one(&*self.conn()?, "SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
    }

    async fn get_users(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * FROM users WHERE id IN ({}) ORDER BY id", placeholders(ids.len()));
        query_all(&*self.conn()?, &sql, params_from_iter(ids.iter()), user_from_row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM users WHERE email = ?1",
            params![email.to_lowercase()],
            user_from_row,
        )
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM users WHERE phone_number = ?1",
            params![phone_number],
            user_from_row,
        )
    }

    async fn find_user_by_merit_id(&self, merit_user_id: &str) -> Result<Option<User>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM users WHERE merit_user_id = ?1",
            params![merit_user_id],
            user_from_row,
        )
    }

    async fn set_merit_user_id(&self, user_id: i64, merit_user_id: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE users SET merit_user_id = ?1 WHERE id = ?2",
            params![merit_user_id, user_id],
        )?;
        Ok(())
    }

    async fn save_otp(&self, challenge: &OtpChallenge) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO otp_challenges (token, user_id, secret, purpose, expires_at, consumed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                challenge.token,
                challenge.user_id,
                challenge.secret,
                challenge.purpose.as_str(),
                ts(challenge.expires_at),
                challenge.consumed
            ],
        )?;
        Ok(())
    }

    async fn get_otp(&self, token: &str) -> Result<Option<OtpChallenge>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM otp_challenges WHERE token = ?1",
            params![token],
            otp_from_row,
        )
    }

    async fn consume_otp(&self, token: &str) -> Result<bool> {
        let n = self.conn()?.execute(
            "UPDATE otp_challenges SET consumed = 1 WHERE token = ?1 AND consumed = 0",
            params![token],
        )?;
        Ok(n == 1)
    }

    async fn record_otp_failure(&self, token: &str, max_failures: u32) -> Result<u32> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE otp_challenges SET failures = failures + 1,
                consumed = CASE WHEN failures + 1 >= ?2 THEN 1 ELSE consumed END
             WHERE token = ?1",
            params![token, max_failures],
        )?;
        let failures: Option<u32> = conn
            .query_row(
                "SELECT failures FROM otp_challenges WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        Ok(failures.unwrap_or_default())
    }

    async fn create_course(&self, input: &CourseInput, created_by: i64) -> Result<Course> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO courses (name, description, thumbnail, price, discount, effective_price, validity_type,
                duration_value, duration_unit, expiry_date, is_published, is_featured, tax_percent,
                internet_handling_charges, created_by, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                input.name,
                input.description,
                input.thumbnail,
                input.price.map(|p| p.to_string()),
                input.discount.to_string(),
                input.effective_price().map(|p| p.to_string()),
                input.validity_type.as_str(),
                input.duration_value,
                input.duration_unit.as_str(),
                input.expiry_date.map(ts),
                input.is_published,
                input.is_featured,
                input.tax_percent,
                input.internet_handling_charges,
                created_by,
                ts(Utc::now())
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM courses WHERE id = ?1", params![id], course_from_row)
            .map_err(Into::into)
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>> {
        query_one(&*self.conn()?, "SELECT * FROM courses WHERE id = ?1", params![id], course_from_row)
    }

    async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM courses WHERE (?1 = 0 OR is_published = 1) ORDER BY id DESC",
            params![published_only],
            course_from_row,
        )
    }

    async fn update_course(&self, id: i64, input: &CourseInput) -> Result<Option<Course>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE courses SET name = ?1, description = ?2, thumbnail = ?3, price = ?4, discount = ?5,
                effective_price = ?6, validity_type = ?7, duration_value = ?8, duration_unit = ?9,
                expiry_date = ?10, is_published = ?11, is_featured = ?12, tax_percent = ?13,
                internet_handling_charges = ?14
             WHERE id = ?15",
            params![
                input.name,
                input.description,
                input.thumbnail,
                input.price.map(|p| p.to_string()),
                input.discount.to_string(),
                input.effective_price().map(|p| p.to_string()),
                input.validity_type.as_str(),
                input.duration_value,
                input.duration_unit.as_str(),
                input.expiry_date.map(ts),
                input.is_published,
                input.is_featured,
                input.tax_percent,
                input.internet_handling_charges,
                id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }
        query_one(&conn, "SELECT * FROM courses WHERE id = ?1", params![id], course_from_row)
    }

    async fn delete_course(&self, id: i64) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM courses WHERE id = ?1", params![id])? > 0)
    }

    async fn set_course_published(&self, id: i64, published: bool) -> Result<bool> {
        Ok(self
            .conn()?
            .execute("UPDATE courses SET is_published = ?1 WHERE id = ?2", params![published, id])?
            > 0)
    }

    async fn create_batch(&self, input: &BatchInput, batch_code: &str, created_by: i64) -> Result<Batch> {
        let conn = self.conn()?;
        let fee_structure = input.fee_structure.as_ref().map(to_json).transpose()?;
        conn.execute(
            "INSERT INTO batches (name, batch_code, start_date, subject, live_class_link, thumbnail,
                is_published, fee_structure, created_by, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                input.name,
                batch_code,
                input.start_date.to_string(),
                input.subject,
                input.live_class_link,
                input.thumbnail,
                input.is_published,
                fee_structure,
                created_by,
                ts(Utc::now())
            ],
        )
        .map_err(|e| conflict_or(e, "A batch with this code already exists."))?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM batches WHERE id = ?1", params![id], batch_from_row)
            .map_err(Into::into)
    }

    async fn get_batch(&self, id: i64) -> Result<Option<Batch>> {
        query_one(&*self.conn()?, "SELECT * FROM batches WHERE id = ?1", params![id], batch_from_row)
    }

    async fn list_batches(&self, published_only: bool) -> Result<Vec<Batch>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM batches WHERE (?1 = 0 OR is_published = 1) ORDER BY id DESC",
            params![published_only],
            batch_from_row,
        )
    }

    async fn update_batch(&self, id: i64, input: &BatchInput) -> Result<Option<Batch>> {
        let conn = self.conn()?;
        let fee_structure = input.fee_structure.as_ref().map(to_json).transpose()?;
        let n = conn.execute(
            "UPDATE batches SET name = ?1, start_date = ?2, subject = ?3, live_class_link = ?4,
                thumbnail = ?5, is_published = ?6, fee_structure = ?7
             WHERE id = ?8",
            params![
                input.name,
                input.start_date.to_string(),
                input.subject,
                input.live_class_link,
                input.thumbnail,
                input.is_published,
                fee_structure,
                id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }
        query_one(&conn, "SELECT * FROM batches WHERE id = ?1", params![id], batch_from_row)
    }

    async fn delete_batch(&self, id: i64) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM batches WHERE id = ?1", params![id])? > 0)
    }

    async fn set_batch_published(&self, id: i64, published: bool) -> Result<bool> {
        Ok(self
            .conn()?
            .execute("UPDATE batches SET is_published = ?1 WHERE id = ?2", params![published, id])?
            > 0)
    }

    async fn create_test_series(&self, input: &TestSeriesInput, created_by: i64) -> Result<TestSeries> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO test_series (name, description, thumbnail, price, discounted_price, effective_price,
                is_digital, url, highlights, is_published, gst, created_by, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                input.name,
                input.description,
                input.thumbnail,
                input.price.to_string(),
                input.discounted_price.to_string(),
                input.effective_price().to_string(),
                input.is_digital,
                input.url,
                to_json(&input.highlights)?,
                input.is_published,
                input.gst,
                created_by,
                ts(Utc::now())
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM test_series WHERE id = ?1", params![id], test_series_from_row)
            .map_err(Into::into)
    }

    async fn get_test_series(&self, id: i64) -> Result<Option<TestSeries>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM test_series WHERE id = ?1",
            params![id],
            test_series_from_row,
        )
    }

    async fn list_test_series(&self, published_only: bool) -> Result<Vec<TestSeries>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM test_series WHERE (?1 = 0 OR is_published = 1) ORDER BY id DESC",
            params![published_only],
            test_series_from_row,
        )
    }

    async fn update_test_series(&self, id: i64, input: &TestSeriesInput) -> Result<Option<TestSeries>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE test_series SET name = ?1, description = ?2, thumbnail = ?3, price = ?4,
                discounted_price = ?5, effective_price = ?6, is_digital = ?7, url = ?8, highlights = ?9,
                is_published = ?10, gst = ?11
             WHERE id = ?12",
            params![
                input.name,
                input.description,
                input.thumbnail,
                input.price.to_string(),
                input.discounted_price.to_string(),
                input.effective_price().to_string(),
                input.is_digital,
                input.url,
                to_json(&input.highlights)?,
                input.is_published,
                input.gst,
                id
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }
        query_one(&conn, "SELECT * FROM test_series WHERE id = ?1", params![id], test_series_from_row)
    }

    async fn delete_test_series(&self, id: i64) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM test_series WHERE id = ?1", params![id])? > 0)
    }

    async fn set_test_series_published(&self, id: i64, published: bool) -> Result<bool> {
        Ok(self
            .conn()?
            .execute("UPDATE test_series SET is_published = ?1 WHERE id = ?2", params![published, id])?
            > 0)
    }

    async fn create_enrollment(&self, batch_id: i64, student_id: i64) -> Result<Enrollment> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO enrollments (batch_id, student_id, is_approved, created) VALUES (?1, ?2, 0, ?3)",
            params![batch_id, student_id, ts(Utc::now())],
        )
        .map_err(|e| conflict_or(e, "The student is already enrolled in this batch."))?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM enrollments WHERE id = ?1", params![id], enrollment_from_row)
            .map_err(Into::into)
    }

    async fn ensure_approved_enrollment(
        &self,
        batch_id: i64,
        student_id: i64,
        approved_by: i64,
    ) -> Result<(Enrollment, bool)> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        let inserted = conn.execute(
            "INSERT INTO enrollments (batch_id, student_id, is_approved, approved_by, batch_joined_date, created)
             VALUES (?1, ?2, 1, ?3, ?4, ?4)
             ON CONFLICT(batch_id, student_id) DO NOTHING",
            params![batch_id, student_id, approved_by, now],
        )?;
        let enrollment = conn.query_row(
            "SELECT * FROM enrollments WHERE batch_id = ?1 AND student_id = ?2",
            params![batch_id, student_id],
            enrollment_from_row,
        )?;
        Ok((enrollment, inserted == 1))
    }

    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM enrollments WHERE id = ?1",
            params![id],
            enrollment_from_row,
        )
    }

    async fn find_enrollment(&self, batch_id: i64, student_id: i64) -> Result<Option<Enrollment>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM enrollments WHERE batch_id = ?1 AND student_id = ?2",
            params![batch_id, student_id],
            enrollment_from_row,
        )
    }

    async fn list_enrollments(&self, batch_id: Option<i64>) -> Result<Vec<Enrollment>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM enrollments WHERE (?1 IS NULL OR batch_id = ?1) ORDER BY id DESC",
            params![batch_id],
            enrollment_from_row,
        )
    }

    async fn approve_enrollment(&self, id: i64, approved_by: i64) -> Result<Option<Enrollment>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE enrollments SET is_approved = 1, approved_by = ?1,
                batch_joined_date = COALESCE(batch_joined_date, ?2)
             WHERE id = ?3",
            params![approved_by, ts(Utc::now()), id],
        )?;
        if n == 0 {
            return Ok(None);
        }
        query_one(&conn, "SELECT * FROM enrollments WHERE id = ?1", params![id], enrollment_from_row)
    }

    async fn delete_enrollment(&self, id: i64) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM enrollments WHERE id = ?1", params![id])? > 0)
    }

    async fn student_enrollments(&self, student_id: i64) -> Result<Vec<Enrollment>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM enrollments WHERE student_id = ?1 ORDER BY id",
            params![student_id],
            enrollment_from_row,
        )
    }

    async fn approved_student_ids(&self, batch_id: i64) -> Result<Vec<i64>> {
        query_all(
            &*self.conn()?,
            "SELECT student_id FROM enrollments WHERE batch_id = ?1 AND is_approved = 1 ORDER BY student_id",
            params![batch_id],
            |row| row.get(0),
        )
    }

    async fn batch_orders(&self, student_id: i64, batch_id: Option<i64>) -> Result<Vec<BatchPurchaseOrder>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM batch_purchase_orders
             WHERE student_id = ?1 AND (?2 IS NULL OR batch_id = ?2)
             ORDER BY batch_id, installment_number",
            params![student_id, batch_id],
            batch_order_from_row,
        )
    }

    async fn record_offline_payment(&self, payment: &OfflinePayment) -> Result<BatchPurchaseOrder> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO batch_purchase_orders
                (student_id, batch_id, installment_number, amount, is_paid, payment_date, reference_number, created)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?5)
             ON CONFLICT(student_id, batch_id, installment_number) DO UPDATE SET
                amount = excluded.amount,
                is_paid = 1,
                payment_date = excluded.payment_date,
                reference_number = excluded.reference_number",
            params![
                payment.student_id,
                payment.batch_id,
                payment.installment_number,
                payment.amount.to_string(),
                ts(Utc::now()),
                payment.reference_number
            ],
        )?;
        conn.query_row(
            "SELECT * FROM batch_purchase_orders WHERE student_id = ?1 AND batch_id = ?2 AND installment_number = ?3",
            params![payment.student_id, payment.batch_id, payment.installment_number],
            batch_order_from_row,
        )
        .map_err(Into::into)
    }

    async fn create_coupon(&self, input: &CouponInput, created_by: i64) -> Result<Coupon> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO coupons (name, code, discount_type, discount_value, max_discount_amount, start_at, end_at,
                lifetime, min_order_value, max_uses, usage_per_student, is_visible, is_expired, status,
                coupon_type, students, courses, is_all_courses, total_applied, created_by, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, 0, ?19, ?20)",
            params![
                input.name,
                input.code,
                input.discount_type.as_str(),
                input.discount_value.to_string(),
                input.max_discount_amount.map(|d| d.to_string()),
                ts(input.start_at),
                input.end_at.map(ts),
                input.lifetime,
                input.min_order_value.to_string(),
                input.max_uses,
                input.usage_per_student,
                input.is_visible,
                input.is_expired,
                input.status,
                input.coupon_type.as_str(),
                to_json(&input.students)?,
                to_json(&input.courses)?,
                input.is_all_courses,
                created_by,
                ts(Utc::now())
            ],
        )
        .map_err(|e| conflict_or(e, "coupon with this Coupon Code already exists."))?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM coupons WHERE id = ?1", params![id], coupon_from_row)
            .map_err(Into::into)
    }

    async fn get_coupon(&self, id: i64) -> Result<Option<Coupon>> {
        query_one(&*self.conn()?, "SELECT * FROM coupons WHERE id = ?1", params![id], coupon_from_row)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM coupons WHERE code = ?1",
            params![code.trim()],
            coupon_from_row,
        )
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        query_all(&*self.conn()?, "SELECT * FROM coupons ORDER BY id DESC", [], coupon_from_row)
    }

    async fn update_coupon(&self, id: i64, input: &CouponInput) -> Result<Option<Coupon>> {
        let conn = self.conn()?;
        let n = conn
            .execute(
                "UPDATE coupons SET name = ?1, code = ?2, discount_type = ?3, discount_value = ?4,
                    max_discount_amount = ?5, start_at = ?6, end_at = ?7, lifetime = ?8, min_order_value = ?9,
                    max_uses = ?10, usage_per_student = ?11, is_visible = ?12, is_expired = ?13, status = ?14,
                    coupon_type = ?15, students = ?16, courses = ?17, is_all_courses = ?18
                 WHERE id = ?19",
                params![
                    input.name,
                    input.code,
                    input.discount_type.as_str(),
                    input.discount_value.to_string(),
                    input.max_discount_amount.map(|d| d.to_string()),
                    ts(input.start_at),
                    input.end_at.map(ts),
                    input.lifetime,
                    input.min_order_value.to_string(),
                    input.max_uses,
                    input.usage_per_student,
                    input.is_visible,
                    input.is_expired,
                    input.status,
                    input.coupon_type.as_str(),
                    to_json(&input.students)?,
                    to_json(&input.courses)?,
                    input.is_all_courses,
                    id
                ],
            )
            .map_err(|e| conflict_or(e, "coupon with this Coupon Code already exists."))?;
        if n == 0 {
            return Ok(None);
        }
        query_one(&conn, "SELECT * FROM coupons WHERE id = ?1", params![id], coupon_from_row)
    }

    async fn delete_coupon(&self, id: i64) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM coupons WHERE id = ?1", params![id])? > 0)
    }

    async fn coupon_uses_by_user(&self, coupon_id: i64, user_id: i64) -> Result<i64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM transactions
                 WHERE coupon_id = ?1 AND user_id = ?2 AND payment_status != 'failed'",
                params![coupon_id, user_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    async fn create_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        let b = &tx.breakdown;
        conn.execute(
            "INSERT INTO transactions (user_id, content_type, content_id, installment_number, amount,
                transaction_id, payment_status, original_price, discount_applied, price_after_coupon,
                gst_percentage, gst_amount, internet_charges, platform_fees, total_amount, coupon_id,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                tx.user_id,
                tx.target.content_type().as_str(),
                tx.target.content_id(),
                tx.target.installment(),
                b.total_amount.to_string(),
                tx.transaction_id,
                b.original_price.to_string(),
                b.discount_applied.to_string(),
                b.price_after_coupon.to_string(),
                b.gst_percentage.to_string(),
                b.gst_amount.to_string(),
                b.internet_charges.to_string(),
                b.platform_fees.to_string(),
                b.total_amount.to_string(),
                tx.coupon_id,
                now
            ],
        )
        .map_err(|e| conflict_or(e, "A transaction for this order already exists."))?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM transactions WHERE id = ?1", params![id], transaction_from_row)
            .map_err(Into::into)
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM transactions WHERE id = ?1",
            params![id],
            transaction_from_row,
        )
    }

    async fn get_transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM transactions WHERE transaction_id = ?1",
            params![order_id],
            transaction_from_row,
        )
    }

    async fn list_transactions(&self) -> Result<Vec<TransactionSummary>> {
        let sql = format!("{TRANSACTION_WITH_NAME} ORDER BY t.id DESC");
        query_all(&*self.conn()?, &sql, [], summary_from_row)
    }

    async fn user_transactions(&self, user_id: i64, status: Option<PaymentStatus>) -> Result<Vec<TransactionSummary>> {
        let sql = format!(
            "{TRANSACTION_WITH_NAME} WHERE t.user_id = ?1 AND (?2 IS NULL OR t.payment_status = ?2) ORDER BY t.id DESC"
        );
        query_all(
            &*self.conn()?,
            &sql,
            params![user_id, status.map(|s| s.as_str())],
            summary_from_row,
        )
    }

    async fn complete_transaction(&self, order_id: &str, payment_id: &str) -> Result<Completion> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = db_tx
            .query_row(
                "SELECT * FROM transactions WHERE transaction_id = ?1",
                params![order_id],
                transaction_from_row,
            )
            .optional()?;
        let Some(mut record) = existing else {
            return Err(ClassroomError::not_found("Transaction does not exist."));
        };

        if record.payment_status == PaymentStatus::Completed {
            db_tx.commit()?;
            debug!("Order {} already completed", order_id);
            return Ok(Completion::AlreadyCompleted(record));
        }

        let now = Utc::now();
        let now_str = ts(now);
        db_tx.execute(
            "UPDATE transactions SET payment_status = 'completed', payment_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![payment_id, now_str, record.id],
        )?;
        record.payment_status = PaymentStatus::Completed;
        record.payment_id = Some(payment_id.to_string());
        record.updated_at = now;

        create_purchase_order(&db_tx, &record, &now_str)?;

        if let Some(coupon_id) = record.coupon_id {
            db_tx.execute(
                "UPDATE coupons SET total_applied = total_applied + 1 WHERE id = ?1",
                params![coupon_id],
            )?;
        }

        db_tx.commit()?;
        info!(
            "Completed {} order {} for user {}",
            record.content_type, order_id, record.user_id
        );
        Ok(Completion::Completed(record))
    }

    async fn fail_transaction(&self, order_id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET payment_status = 'failed', updated_at = ?1
             WHERE transaction_id = ?2 AND payment_status = 'pending'",
            params![ts(Utc::now()), order_id],
        )?;
        query_one(
            &conn,
            "SELECT * FROM transactions WHERE transaction_id = ?1",
            params![order_id],
            transaction_from_row,
        )
    }

    async fn purchased_course_ids(&self, student_id: i64) -> Result<Vec<i64>> {
        query_all(
            &*self.conn()?,
            "SELECT DISTINCT course_id FROM course_purchase_orders WHERE student_id = ?1 ORDER BY course_id",
            params![student_id],
            |row| row.get(0),
        )
    }

    async fn purchased_test_series_ids(&self, student_id: i64) -> Result<Vec<i64>> {
        query_all(
            &*self.conn()?,
            "SELECT DISTINCT test_series_id FROM test_series_purchase_orders WHERE student_id = ?1
             ORDER BY test_series_id",
            params![student_id],
            |row| row.get(0),
        )
    }

    async fn list_product_orders(&self, status: Option<DeliveryStatus>) -> Result<Vec<ProductOrderSummary>> {
        let sql = format!("{PRODUCT_ORDER_WITH_NAMES} WHERE ?1 IS NULL OR p.delivery_status = ?1 ORDER BY p.id DESC");
        query_all(
            &*self.conn()?,
            &sql,
            params![status.map(|s| s.as_str())],
            product_order_from_row,
        )
    }

    async fn get_product_order(&self, id: i64) -> Result<Option<ProductOrderSummary>> {
        let sql = format!("{PRODUCT_ORDER_WITH_NAMES} WHERE p.id = ?1");
        query_one(&*self.conn()?, &sql, params![id], product_order_from_row)
    }

    async fn set_delivery_status(&self, id: i64, status: DeliveryStatus) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE physical_product_orders SET delivery_status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    async fn course_buyer_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        query_all(
            &*self.conn()?,
            "SELECT DISTINCT student_id FROM course_purchase_orders WHERE course_id = ?1 ORDER BY student_id",
            params![course_id],
            |row| row.get(0),
        )
    }

    async fn has_batch_access(&self, student_id: i64, batch_id: i64) -> Result<bool> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM enrollments
                               WHERE student_id = ?1 AND batch_id = ?2 AND is_approved = 1)
                     OR EXISTS(SELECT 1 FROM batch_purchase_orders
                               WHERE student_id = ?1 AND batch_id = ?2 AND is_paid = 1)",
                params![student_id, batch_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    async fn create_live_class(&self, class: &NewLiveClass) -> Result<LiveClass> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO live_classes (batch_id, title, class_id, date, status, host_link, common_host_link,
                common_moderator_link, common_participant_link, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                class.batch_id,
                class.title,
                class.class_id,
                ts(class.date),
                ClassStatus::Scheduled.as_str(),
                class.host_link,
                class.common_host_link,
                class.common_moderator_link,
                class.common_participant_link,
                ts(Utc::now())
            ],
        )
        .map_err(|e| conflict_or(e, "A live class with this class id already exists."))?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM live_classes WHERE id = ?1", params![id], live_class_from_row)
            .map_err(Into::into)
    }

    async fn list_live_classes(&self, batch_id: i64) -> Result<Vec<LiveClass>> {
        query_all(
            &*self.conn()?,
            "SELECT * FROM live_classes WHERE batch_id = ?1 ORDER BY date DESC",
            params![batch_id],
            live_class_from_row,
        )
    }

    async fn find_live_class(&self, class_id: &str) -> Result<Option<LiveClass>> {
        query_one(
            &*self.conn()?,
            "SELECT * FROM live_classes WHERE class_id = ?1",
            params![class_id],
            live_class_from_row,
        )
    }

    async fn set_class_status(&self, class_id: &str, status: ClassStatus) -> Result<bool> {
        Ok(self.conn()?.execute(
            "UPDATE live_classes SET status = ?1 WHERE class_id = ?2",
            params![status.as_str(), class_id],
        )? > 0)
    }

    async fn set_recording(&self, update: &RecordingUpdate) -> Result<bool> {
        Ok(self.conn()?.execute(
            "UPDATE live_classes SET recording_url = ?1, recording_status = ?2, duration = ?3 WHERE class_id = ?4",
            params![update.url, update.status, update.duration, update.class_id],
        )? > 0)
    }

    async fn upsert_attendance(&self, student_id: i64, live_class_id: i64, entry: &AttendanceEntry) -> Result<()> {
        let analytics = entry.analytics.as_ref().map(to_json).transpose()?;
        self.conn()?.execute(
            "INSERT INTO attendances (student_id, live_class_id, attended, analytics, browser, ip, os,
                start_time, total_time)
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(student_id, live_class_id) DO UPDATE SET
                attended = 1,
                analytics = excluded.analytics,
                browser = excluded.browser,
                ip = excluded.ip,
                os = excluded.os,
                start_time = excluded.start_time,
                total_time = excluded.total_time",
            params![
                student_id,
                live_class_id,
                analytics,
                entry.browser,
                entry.ip,
                entry.os,
                entry.start_time,
                entry.total_time
            ],
        )?;
        Ok(())
    }

    async fn student_attendance(&self, student_id: i64, batch_id: i64) -> Result<Vec<Attendance>> {
        query_all(
            &*self.conn()?,
            "SELECT a.* FROM attendances a
             JOIN live_classes lc ON lc.id = a.live_class_id
             WHERE a.student_id = ?1 AND lc.batch_id = ?2
             ORDER BY lc.date DESC",
            params![student_id, batch_id],
            attendance_from_row,
        )
    }

    async fn register_device(&self, user_id: i64, registration_id: &str) -> Result<Device> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO devices (user_id, registration_id, active) VALUES (?1, ?2, 1)
             ON CONFLICT(registration_id) DO UPDATE SET user_id = excluded.user_id, active = 1",
            params![user_id, registration_id],
        )?;
        conn.query_row(
            "SELECT * FROM devices WHERE registration_id = ?1",
            params![registration_id],
            device_from_row,
        )
        .map_err(Into::into)
    }

    async fn active_device_tokens(&self, user_ids: Option<&[i64]>) -> Result<Vec<String>> {
        let conn = self.conn()?;
        match user_ids {
            None => query_all(
                &conn,
                "SELECT registration_id FROM devices WHERE active = 1 ORDER BY id",
                [],
                |row| row.get(0),
            ),
            Some([]) => Ok(Vec::new()),
            Some(ids) => {
                let sql = format!(
                    "SELECT registration_id FROM devices WHERE active = 1 AND user_id IN ({}) ORDER BY id",
                    placeholders(ids.len())
                );
                query_all(&conn, &sql, params_from_iter(ids.iter()), |row| row.get(0))
            }
        }
    }

    async fn create_notification(&self, request: &NotificationRequest, sender_id: i64) -> Result<PushNotification> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO push_notifications (title, message, criteria, course_id, batch_id, student_ids, sent_at, sender_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                request.title,
                request.message,
                request.criteria.as_str(),
                request.course,
                request.batch,
                to_json(&request.student_ids)?,
                ts(Utc::now()),
                sender_id
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT * FROM push_notifications WHERE id = ?1",
            params![id],
            notification_from_row,
        )
        .map_err(Into::into)
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationView>> {
        let conn = self.conn()?;
        let rows = query_all(
            &conn,
            "SELECT n.*, c.name AS course_title, b.name AS batch_title
             FROM push_notifications n
             LEFT JOIN courses c ON c.id = n.course_id
             LEFT JOIN batches b ON b.id = n.batch_id
             ORDER BY n.id DESC",
            [],
            |row| {
                Ok((
                    notification_from_row(row)?,
                    row.get::<_, Option<String>>("course_title")?,
                    row.get::<_, Option<String>>("batch_title")?,
                ))
            },
        )?;

        let mut wanted: Vec<i64> = rows.iter().flat_map(|(n, _, _)| n.student_ids.iter().copied()).collect();
        wanted.sort_unstable();
        wanted.dedup();
        let names: HashMap<i64, String> = if wanted.is_empty() {
            HashMap::new()
        } else {
            let sql = format!("SELECT id, full_name FROM users WHERE id IN ({})", placeholders(wanted.len()));
            query_all(&conn, &sql, params_from_iter(wanted.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .into_iter()
            .collect()
        };

        Ok(rows
            .into_iter()
            .map(|(notification, course_title, batch_title)| {
                let student_names = notification
                    .student_ids
                    .iter()
                    .filter_map(|id| names.get(id).cloned())
                    .collect();
                NotificationView {
                    notification,
                    course_title,
                    batch_title,
                    student_names,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::domain::catalog::{DurationUnit, Frequency, ValidityType};
    use crate::domain::coupon::{CouponType, DiscountType};
    use crate::domain::pricing::fee_breakdown;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    async fn store_with_student() -> (SqliteStorage, User) {
        let store = SqliteStorage::open_in_memory().unwrap();
        let user = store
            .create_user(&NewUser::student("s@example.com", "+919876543210", "Student"))
            .await
            .unwrap();
        (store, user)
    }

    fn course_input() -> CourseInput {
        CourseInput {
            name: "Algebra".into(),
            description: String::new(),
            thumbnail: String::new(),
            price: Some(Decimal::new(1000, 0)),
            discount: Decimal::new(10, 0),
            validity_type: ValidityType::Lifetime,
            duration_value: None,
            duration_unit: DurationUnit::Days,
            expiry_date: None,
            is_published: true,
            is_featured: false,
            tax_percent: None,
            internet_handling_charges: false,
        }
    }

    fn coupon_input() -> CouponInput {
        CouponInput {
            name: "Launch".into(),
            code: "LAUNCH".into(),
            discount_type: DiscountType::Fixed,
            discount_value: Decimal::new(100, 0),
            max_discount_amount: None,
            start_at: Utc::now(),
            end_at: None,
            lifetime: true,
            min_order_value: Decimal::ZERO,
            max_uses: Some(5),
            usage_per_student: None,
            is_visible: true,
            is_expired: false,
            status: true,
            coupon_type: CouponType::Public,
            students: vec![],
            courses: vec![],
            is_all_courses: true,
        }
    }

    #[tokio::test]
    async fn test_complete_transaction_is_idempotent() {
        let (store, user) = store_with_student().await;
        let course = store.create_course(&course_input(), user.id).await.unwrap();
        assert_eq!(course.effective_price, Some(Decimal::new(90000, 2)));
        let coupon = store.create_coupon(&coupon_input(), user.id).await.unwrap();

        let breakdown = fee_breakdown(Decimal::new(900, 0), Decimal::new(100, 0), None, &FeeConfig::default());
        let pending = store
            .create_transaction(&NewTransaction {
                user_id: user.id,
                target: PurchaseTarget::Course(course.id),
                transaction_id: "order_1".into(),
                breakdown: breakdown.clone(),
                coupon_id: Some(coupon.id),
            })
            .await
            .unwrap();
        assert_eq!(pending.payment_status, PaymentStatus::Pending);
        assert_eq!(pending.amount, breakdown.total_amount);

        let first = store.complete_transaction("order_1", "pay_1").await.unwrap();
        assert!(matches!(first, Completion::Completed(_)));
        let second = store.complete_transaction("order_1", "pay_1").await.unwrap();
        assert!(matches!(second, Completion::AlreadyCompleted(_)));

        assert_eq!(store.purchased_course_ids(user.id).await.unwrap(), vec![course.id]);
        assert_eq!(store.course_buyer_ids(course.id).await.unwrap(), vec![user.id]);
        let coupon = store.get_coupon(coupon.id).await.unwrap().unwrap();
        assert_eq!(coupon.total_applied, 1);
        assert_eq!(store.coupon_uses_by_user(coupon.id, user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_complete_unknown_order() {
        let (store, _) = store_with_student().await;
        let err = store.complete_transaction("missing", "pay").await.unwrap_err();
        assert!(matches!(err, ClassroomError::NotFound(ref m) if m == "Transaction does not exist."));
    }

    #[tokio::test]
    async fn test_fail_never_downgrades_completed() {
        let (store, user) = store_with_student().await;
        let course = store.create_course(&course_input(), user.id).await.unwrap();
        let breakdown = fee_breakdown(Decimal::new(900, 0), Decimal::ZERO, None, &FeeConfig::default());
        for order in ["order_a", "order_b"] {
            store
                .create_transaction(&NewTransaction {
                    user_id: user.id,
                    target: PurchaseTarget::Course(course.id),
                    transaction_id: order.into(),
                    breakdown: breakdown.clone(),
                    coupon_id: None,
                })
                .await
                .unwrap();
        }
        store.complete_transaction("order_a", "pay_a").await.unwrap();

        let a = store.fail_transaction("order_a").await.unwrap().unwrap();
        assert_eq!(a.payment_status, PaymentStatus::Completed);
        let b = store.fail_transaction("order_b").await.unwrap().unwrap();
        assert_eq!(b.payment_status, PaymentStatus::Failed);
        assert!(store.fail_transaction("nope").await.unwrap().is_none());

        let completed = store
            .user_transactions(user.id, Some(PaymentStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].content_name.as_deref(), Some("Algebra"));
    }

    #[tokio::test]
    async fn test_batch_installment_and_access() {
        let (store, user) = store_with_student().await;
        let batch = store
            .create_batch(
                &BatchInput {
                    name: "Morning".into(),
                    start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    subject: "Maths".into(),
                    live_class_link: None,
                    thumbnail: None,
                    is_published: true,
                    fee_structure: Some(FeeStructure {
                        structure_name: "Monthly".into(),
                        fee_amount: Decimal::new(2000, 0),
                        installments: 3,
                        frequency: Some(Frequency::Monthly),
                        number_of_values: 1,
                    }),
                },
                "ABCD1234",
                user.id,
            )
            .await
            .unwrap();
        assert_eq!(batch.fee_structure.as_ref().unwrap().installments, 3);
        assert!(!store.has_batch_access(user.id, batch.id).await.unwrap());

        let order = store
            .record_offline_payment(&OfflinePayment {
                student_id: user.id,
                batch_id: batch.id,
                installment_number: 1,
                amount: Decimal::new(2383, 0),
                reference_number: Some("CASH-1".into()),
            })
            .await
            .unwrap();
        assert!(order.is_paid);
        assert!(store.has_batch_access(user.id, batch.id).await.unwrap());
        assert_eq!(store.batch_orders(user.id, Some(batch.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enrollment_lifecycle() {
        let (store, user) = store_with_student().await;
        let batch = store
            .create_batch(
                &BatchInput {
                    name: "Evening".into(),
                    start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    subject: String::new(),
                    live_class_link: None,
                    thumbnail: None,
                    is_published: true,
                    fee_structure: None,
                },
                "ZZZZ9999",
                user.id,
            )
            .await
            .unwrap();

        let pending = store.create_enrollment(batch.id, user.id).await.unwrap();
        assert!(!pending.is_approved);
        let dup = store.create_enrollment(batch.id, user.id).await.unwrap_err();
        assert!(matches!(dup, ClassroomError::Conflict(_)));

        let approved = store.approve_enrollment(pending.id, user.id).await.unwrap().unwrap();
        assert!(approved.is_approved);
        assert!(approved.batch_joined_date.is_some());
        assert_eq!(store.approved_student_ids(batch.id).await.unwrap(), vec![user.id]);

        let (_, created) = store.ensure_approved_enrollment(batch.id, user.id, user.id).await.unwrap();
        assert!(!created);
        assert!(store.delete_enrollment(pending.id).await.unwrap());
        assert!(store.find_enrollment(batch.id, user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("classroom.db");
        {
            let store = SqliteStorage::open(&path).unwrap();
            store
                .create_user(&NewUser::student("p@example.com", "+919000000001", "P"))
                .await
                .unwrap();
        }
        let store = SqliteStorage::open(&path).unwrap();
        assert!(store.find_user_by_email("P@example.com").await.unwrap().is_some());
    }

    fn printed_series() -> TestSeriesInput {
        TestSeriesInput {
            name: "Mock papers".into(),
            description: None,
            thumbnail: None,
            price: Decimal::new(500, 0),
            discounted_price: Decimal::new(400, 0),
            is_digital: false,
            url: None,
            highlights: vec!["10 papers".into()],
            is_published: true,
            gst: 0,
        }
    }

    async fn pending(store: &SqliteStorage, user: &User, target: PurchaseTarget, order: &str) -> Transaction {
        let breakdown = fee_breakdown(Decimal::new(400, 0), Decimal::ZERO, Some(Decimal::ZERO), &FeeConfig::default());
        store
            .create_transaction(&NewTransaction {
                user_id: user.id,
                target,
                transaction_id: order.into(),
                breakdown,
                coupon_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_printed_test_series_creates_delivery_order() {
        let (store, user) = store_with_student().await;
        let printed = store.create_test_series(&printed_series(), user.id).await.unwrap();
        let mut digital_input = printed_series();
        digital_input.is_digital = true;
        let digital = store.create_test_series(&digital_input, user.id).await.unwrap();

        pending(&store, &user, PurchaseTarget::TestSeries(printed.id), "order_print").await;
        pending(&store, &user, PurchaseTarget::TestSeries(digital.id), "order_digital").await;
        store.complete_transaction("order_print", "pay_print").await.unwrap();
        store.complete_transaction("order_digital", "pay_digital").await.unwrap();

        assert_eq!(
            store.purchased_test_series_ids(user.id).await.unwrap(),
            vec![printed.id, digital.id]
        );
        let orders = store.list_product_orders(None).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order.test_series_id, printed.id);
        assert_eq!(orders[0].order.user_id, user.id);
        assert_eq!(orders[0].order.delivery_status, DeliveryStatus::DeliveryPending);
        assert_eq!(orders[0].test_series_name, "Mock papers");

        let id = orders[0].order.id;
        assert!(store.set_delivery_status(id, DeliveryStatus::Shipped).await.unwrap());
        let shipped = store.get_product_order(id).await.unwrap().unwrap();
        assert_eq!(shipped.order.delivery_status, DeliveryStatus::Shipped);
        assert!(store
            .list_product_orders(Some(DeliveryStatus::DeliveryPending))
            .await
            .unwrap()
            .is_empty());
        assert!(!store.set_delivery_status(999, DeliveryStatus::Delivered).await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_after_content_deleted() {
        let (store, user) = store_with_student().await;
        let course = store.create_course(&course_input(), user.id).await.unwrap();
        let series = store.create_test_series(&printed_series(), user.id).await.unwrap();
        pending(&store, &user, PurchaseTarget::Course(course.id), "order_course").await;
        pending(&store, &user, PurchaseTarget::TestSeries(series.id), "order_series").await;

        assert!(store.delete_course(course.id).await.unwrap());
        assert!(store.delete_test_series(series.id).await.unwrap());

        let done = store.complete_transaction("order_course", "pay_course").await.unwrap();
        assert!(matches!(done, Completion::Completed(_)));
        assert_eq!(done.transaction().payment_status, PaymentStatus::Completed);
        let done = store.complete_transaction("order_series", "pay_series").await.unwrap();
        assert_eq!(done.transaction().payment_status, PaymentStatus::Completed);

        let stored = store.get_transaction_by_order("order_course").await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.payment_id.as_deref(), Some("pay_course"));
        assert!(store.purchased_course_ids(user.id).await.unwrap().is_empty());
        assert!(store.list_product_orders(None).await.unwrap().is_empty());
    }
}
