//! Postgres-backed store.
//!
//! Every mutating operation opens a transaction and takes one advisory lock
//! first, so read-check-write sequences on the pool never interleave. Partial
//! unique indexes back the slot and email rules so a bypassing writer still
//! cannot corrupt the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::{
    build_audit_entry, Admission, AuditAction, AuditLogEntry, AuditQuery, AuditSubject,
    CapacitySnapshot, Category, CategoryId, EntryFilter, EntryId, Member, MemberId, NewEntry,
    NewMember, Outcome, PoolCounts, SlotAllocator, SlotClaim, Transition, TransitionRequest,
    WaitlistEntry, WaitlistError, WaitlistStatus, WaitlistStore,
};

/// Key for `pg_advisory_xact_lock`; one lock serializes all pool mutations.
pub const POOL_LOCK_KEY: i64 = 0x776c_706f_6f6c;

/// Store over a Postgres connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    capacity: u32,
}

#[derive(sqlx::FromRow)]
struct CountsRow {
    active_members: i64,
    waiting: i64,
    notified: i64,
}

impl From<CountsRow> for PoolCounts {
    fn from(row: CountsRow) -> Self {
        let clamp = |n: i64| u32::try_from(n).unwrap_or(u32::MAX);
        Self {
            active_members: clamp(row.active_members),
            waiting: clamp(row.waiting),
            notified: clamp(row.notified),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    email: String,
    company_name: String,
    category_id: Uuid,
    message: Option<String>,
    position: i64,
    status: String,
    notified_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for WaitlistEntry {
    type Error = WaitlistError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<WaitlistStatus>()
            .map_err(|err| WaitlistError::Storage(err.to_string()))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            company_name: row.company_name,
            category_id: row.category_id,
            message: row.message,
            position: row.position,
            status,
            notified_at: row.notified_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    email: String,
    company_name: String,
    category_id: Uuid,
    slot_number: i32,
    active: bool,
    approved_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<MemberRow> for Member {
    type Error = WaitlistError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: row.email,
            company_name: row.company_name,
            category_id: row.category_id,
            slot_number: to_u32("slot_number", row.slot_number)?,
            active: row.active,
            approved_at: row.approved_at,
            deactivated_at: row.deactivated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    total_capacity: i32,
    current_count: i32,
    available_slots: i32,
    waitlist_count: i32,
    notified_count: i32,
    is_full: bool,
    category_id: Option<Uuid>,
    related_entry_id: Option<Uuid>,
    related_member_id: Option<Uuid>,
    actor: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = WaitlistError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AuditAction::parse(&row.action).ok_or_else(|| {
            WaitlistError::Storage(format!("unknown audit action `{}`", row.action))
        })?;
        Ok(Self {
            id: row.id,
            action,
            snapshot: CapacitySnapshot {
                total_capacity: to_u32("total_capacity", row.total_capacity)?,
                current_count: to_u32("current_count", row.current_count)?,
                available_slots: to_u32("available_slots", row.available_slots)?,
                waitlist_count: to_u32("waitlist_count", row.waitlist_count)?,
                notified_count: to_u32("notified_count", row.notified_count)?,
                is_full: row.is_full,
            },
            category_id: row.category_id,
            related_entry_id: row.related_entry_id,
            related_member_id: row.related_member_id,
            actor: row.actor,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

fn to_u32(column: &str, value: i32) -> Result<u32, WaitlistError> {
    u32::try_from(value)
        .map_err(|_| WaitlistError::Storage(format!("negative {column} in database: {value}")))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn entries_from(rows: Vec<EntryRow>) -> Result<Vec<WaitlistEntry>, WaitlistError> {
    rows.into_iter().map(WaitlistEntry::try_from).collect()
}

fn members_from(rows: Vec<MemberRow>) -> Result<Vec<Member>, WaitlistError> {
    rows.into_iter().map(Member::try_from).collect()
}

const ENTRY_ORDER: &str = "CASE status \
    WHEN 'waiting' THEN 0 WHEN 'notified' THEN 1 WHEN 'promoted' THEN 2 \
    WHEN 'expired' THEN 3 WHEN 'cancelled' THEN 4 ELSE 5 END, position";

async fn counts_in(conn: &mut PgConnection) -> Result<PoolCounts, WaitlistError> {
    let row = sqlx::query_as::<_, CountsRow>(
        "SELECT
            (SELECT COUNT(*) FROM wl_members WHERE active) AS active_members,
            (SELECT COUNT(*) FROM wl_entries WHERE status = $1) AS waiting,
            (SELECT COUNT(*) FROM wl_entries WHERE status = $2) AS notified",
    )
    .bind(WaitlistStatus::Waiting.as_str())
    .bind(WaitlistStatus::Notified.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.into())
}

async fn category_exists(conn: &mut PgConnection, id: CategoryId) -> Result<bool, WaitlistError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM wl_categories WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

async fn active_email(conn: &mut PgConnection, email: &str) -> Result<bool, WaitlistError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM wl_members WHERE active AND email = $1)",
    )
    .bind(email)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

async fn open_entry_email(conn: &mut PgConnection, email: &str) -> Result<bool, WaitlistError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM wl_entries
            WHERE status = ANY($2) AND email = $1
        )",
    )
    .bind(email)
    .bind(open_status_names())
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

/// States that hold an email against re-enrollment.
fn open_status_names() -> Vec<&'static str> {
    WaitlistStatus::ALL
        .into_iter()
        .filter(|s| s.holds_email())
        .map(WaitlistStatus::as_str)
        .collect()
}

async fn entry_for_update(
    conn: &mut PgConnection,
    id: EntryId,
) -> Result<Option<WaitlistEntry>, WaitlistError> {
    sqlx::query_as::<_, EntryRow>("SELECT * FROM wl_entries WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(WaitlistEntry::try_from)
        .transpose()
}

/// Checks shared by every path that activates a member, then the smallest free slot.
async fn claim_slot(
    conn: &mut PgConnection,
    capacity: u32,
    email: &str,
    claim: SlotClaim,
) -> Result<u32, WaitlistError> {
    if active_email(conn, email).await? {
        return Err(WaitlistError::Conflict(format!(
            "{email} is already an active member"
        )));
    }
    let snapshot = CapacitySnapshot::from_counts(capacity, counts_in(conn).await?);
    if claim.open_slots(&snapshot) == 0 {
        return Err(WaitlistError::PoolFull { capacity });
    }
    let used = sqlx::query_scalar::<_, i32>("SELECT slot_number FROM wl_members WHERE active")
        .fetch_all(&mut *conn)
        .await?;
    let used = used
        .into_iter()
        .map(|slot| to_u32("slot_number", slot))
        .collect::<Result<Vec<_>, _>>()?;
    SlotAllocator::new(capacity).assign_slot(used)
}

async fn insert_member_row(
    conn: &mut PgConnection,
    member: &Member,
) -> Result<Member, WaitlistError> {
    sqlx::query_as::<_, MemberRow>(
        "INSERT INTO wl_members
            (id, email, company_name, category_id, slot_number, active, approved_at)
         VALUES ($1, $2, $3, $4, $5, TRUE, $6)
         RETURNING *",
    )
    .bind(member.id)
    .bind(&member.email)
    .bind(&member.company_name)
    .bind(member.category_id)
    .bind(to_i32(member.slot_number))
    .bind(member.approved_at)
    .fetch_one(&mut *conn)
    .await?
    .try_into()
}

/// Append an audit entry carrying the counts as they stand inside this transaction.
async fn record(
    conn: &mut PgConnection,
    capacity: u32,
    action: AuditAction,
    subject: AuditSubject,
    metadata: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<(), WaitlistError> {
    let snapshot = CapacitySnapshot::from_counts(capacity, counts_in(conn).await?);
    let entry = build_audit_entry(action, snapshot, subject, metadata, now);
    sqlx::query(
        "INSERT INTO wl_audit_log (
            id, action, total_capacity, current_count, available_slots, waitlist_count,
            notified_count, is_full, category_id, related_entry_id, related_member_id,
            actor, metadata, created_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(entry.id)
    .bind(entry.action.as_str())
    .bind(to_i32(entry.snapshot.total_capacity))
    .bind(to_i32(entry.snapshot.current_count))
    .bind(to_i32(entry.snapshot.available_slots))
    .bind(to_i32(entry.snapshot.waitlist_count))
    .bind(to_i32(entry.snapshot.notified_count))
    .bind(entry.snapshot.is_full)
    .bind(entry.category_id)
    .bind(entry.related_entry_id)
    .bind(entry.related_member_id)
    .bind(&entry.actor)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl PostgresStore {
    /// Wrap an existing pool. Call [`Self::migrate`] before first use.
    #[must_use]
    pub const fn new(pool: PgPool, capacity: u32) -> Self {
        Self { pool, capacity }
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Migration statements for the pool schema.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS wl_categories (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL
);
",
            r"
CREATE TABLE IF NOT EXISTS wl_members (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    company_name TEXT NOT NULL,
    category_id UUID NOT NULL REFERENCES wl_categories (id),
    slot_number INT NOT NULL CHECK (slot_number >= 1),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    approved_at TIMESTAMPTZ NOT NULL,
    deactivated_at TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_wl_members_active_slot
    ON wl_members (slot_number) WHERE active;
CREATE UNIQUE INDEX IF NOT EXISTS idx_wl_members_active_email
    ON wl_members (email) WHERE active;
",
            r"
CREATE TABLE IF NOT EXISTS wl_entries (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    company_name TEXT NOT NULL,
    category_id UUID NOT NULL REFERENCES wl_categories (id),
    message TEXT,
    position BIGINT NOT NULL UNIQUE,
    status TEXT NOT NULL
        CHECK (status IN ('waiting', 'notified', 'promoted', 'expired', 'cancelled')),
    notified_at TIMESTAMPTZ,
    expires_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    CHECK (status <> 'notified' OR expires_at IS NOT NULL)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_wl_entries_open_email
    ON wl_entries (email) WHERE status IN ('waiting', 'notified');
CREATE INDEX IF NOT EXISTS idx_wl_entries_status_position
    ON wl_entries (status, position);
CREATE INDEX IF NOT EXISTS idx_wl_entries_notified_expiry
    ON wl_entries (expires_at) WHERE status = 'notified';
",
            r"
CREATE TABLE IF NOT EXISTS wl_audit_log (
    seq BIGSERIAL PRIMARY KEY,
    id UUID NOT NULL UNIQUE,
    action TEXT NOT NULL,
    total_capacity INT NOT NULL,
    current_count INT NOT NULL,
    available_slots INT NOT NULL,
    waitlist_count INT NOT NULL,
    notified_count INT NOT NULL,
    is_full BOOLEAN NOT NULL,
    category_id UUID,
    related_entry_id UUID,
    related_member_id UUID,
    actor TEXT,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wl_audit_log_entry ON wl_audit_log (related_entry_id);
CREATE INDEX IF NOT EXISTS idx_wl_audit_log_member ON wl_audit_log (related_member_id);
",
        ]
    }

    /// Apply [`Self::migrations`]. Idempotent.
    pub async fn migrate(&self) -> Result<(), WaitlistError> {
        for statement in Self::migrations() {
            sqlx::raw_sql(statement).execute(&self.pool).await?;
        }
        tracing::debug!("waitlist schema migrated");
        Ok(())
    }

    /// Open a transaction holding the pool lock.
    async fn begin_locked(&self) -> Result<Transaction<'static, Postgres>, WaitlistError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(POOL_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl WaitlistStore for PostgresStore {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    async fn counts(&self) -> Result<PoolCounts, WaitlistError> {
        let mut conn = self.pool.acquire().await?;
        counts_in(&mut conn).await
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), WaitlistError> {
        sqlx::query(
            "INSERT INTO wl_categories (id, name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(category.id)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, WaitlistError> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, name FROM wl_categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name)| Category { id, name }))
    }

    async fn email_in_use(&self, email: &str) -> Result<bool, WaitlistError> {
        let mut conn = self.pool.acquire().await?;
        Ok(active_email(&mut conn, email).await? || open_entry_email(&mut conn, email).await?)
    }

    async fn insert_entry(
        &self,
        entry: NewEntry,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        if !category_exists(&mut tx, entry.category_id).await? {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                entry.category_id
            )));
        }
        if active_email(&mut tx, &entry.email).await?
            || open_entry_email(&mut tx, &entry.email).await?
        {
            return Err(WaitlistError::Conflict(format!(
                "{} already holds a member slot or an open waitlist entry",
                entry.email
            )));
        }

        let created: WaitlistEntry = sqlx::query_as::<_, EntryRow>(
            "INSERT INTO wl_entries
                (id, email, company_name, category_id, message, position, status,
                 created_at, updated_at)
             VALUES (
                $1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM wl_entries),
                'waiting', $6, $6
             )
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&entry.email)
        .bind(&entry.company_name)
        .bind(entry.category_id)
        .bind(&entry.message)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        record(
            &mut tx,
            self.capacity,
            AuditAction::Enrolled,
            AuditSubject {
                category_id: Some(created.category_id),
                entry_id: Some(created.id),
                member_id: None,
                actor: entry.actor,
            },
            Some(json!({ "position": created.position })),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<Outcome<WaitlistEntry>, WaitlistError> {
        request.check()?;
        let mut tx = self.begin_locked().await?;
        let current = entry_for_update(&mut tx, request.entry_id)
            .await?
            .ok_or_else(|| WaitlistError::NotFound(format!("waitlist entry {}", request.entry_id)))?;
        let Some(target) = current.status.apply(request.transition) else {
            return Ok(Outcome::AlreadyHandled);
        };

        let is_notify = request.transition == Transition::Notify;
        let updated: WaitlistEntry = sqlx::query_as::<_, EntryRow>(
            "UPDATE wl_entries
             SET status = $2,
                 updated_at = $3,
                 notified_at = CASE WHEN $4 THEN $3 ELSE notified_at END,
                 expires_at = CASE WHEN $4 THEN $5 ELSE expires_at END
             WHERE id = $1 AND status = $6
             RETURNING *",
        )
        .bind(request.entry_id)
        .bind(target.as_str())
        .bind(request.now)
        .bind(is_notify)
        .bind(request.expires_at)
        .bind(current.status.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        record(
            &mut tx,
            self.capacity,
            request.transition.into(),
            AuditSubject {
                category_id: Some(updated.category_id),
                entry_id: Some(updated.id),
                member_id: None,
                actor: request.actor,
            },
            Some(json!({ "from": current.status, "expires_at": updated.expires_at })),
            request.now,
        )
        .await?;
        tx.commit().await?;
        Ok(Outcome::Applied(updated))
    }

    async fn notify_next(
        &self,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        let snapshot = CapacitySnapshot::from_counts(self.capacity, counts_in(&mut tx).await?);
        if snapshot.unoffered_slots() == 0 {
            return Ok(None);
        }

        let next = sqlx::query_as::<_, EntryRow>(
            "UPDATE wl_entries
             SET status = $3, notified_at = $1, expires_at = $2, updated_at = $1
             WHERE id = (
                SELECT id FROM wl_entries
                WHERE status = ANY($4)
                ORDER BY position
                LIMIT 1
                FOR UPDATE
             )
             RETURNING *",
        )
        .bind(now)
        .bind(expires_at)
        .bind(Transition::Notify.target().as_str())
        .bind(Transition::Notify.source_names())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = next else {
            return Ok(None);
        };
        let entry = WaitlistEntry::try_from(row)?;

        record(
            &mut tx,
            self.capacity,
            AuditAction::Notified,
            AuditSubject {
                category_id: Some(entry.category_id),
                entry_id: Some(entry.id),
                member_id: None,
                actor: None,
            },
            Some(json!({ "from": Transition::Notify.sources().first(), "expires_at": expires_at })),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(entry))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        let rows = sqlx::query_as::<_, EntryRow>(
            "UPDATE wl_entries
             SET status = $2, updated_at = $1
             WHERE status = ANY($3) AND expires_at < $1
             RETURNING *",
        )
        .bind(now)
        .bind(Transition::Expire.target().as_str())
        .bind(Transition::Expire.source_names())
        .fetch_all(&mut *tx)
        .await?;
        let mut expired = entries_from(rows)?;
        expired.sort_by_key(|e| e.position);

        for entry in &expired {
            record(
                &mut tx,
                self.capacity,
                AuditAction::Expired,
                AuditSubject {
                    category_id: Some(entry.category_id),
                    entry_id: Some(entry.id),
                    member_id: None,
                    actor: None,
                },
                Some(json!({ "expires_at": entry.expires_at })),
                now,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(expired)
    }

    async fn promote_and_admit(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Admission>, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        let current = entry_for_update(&mut tx, entry_id)
            .await?
            .ok_or_else(|| WaitlistError::NotFound(format!("waitlist entry {entry_id}")))?;
        if !current.status.allows(Transition::Promote) || current.is_overdue(now) {
            return Ok(Outcome::AlreadyHandled);
        }
        let slot_number =
            claim_slot(&mut tx, self.capacity, &current.email, SlotClaim::Offer).await?;

        let promoted: WaitlistEntry = sqlx::query_as::<_, EntryRow>(
            "UPDATE wl_entries SET status = $3, updated_at = $2
             WHERE id = $1 AND status = ANY($4)
             RETURNING *",
        )
        .bind(entry_id)
        .bind(now)
        .bind(Transition::Promote.target().as_str())
        .bind(Transition::Promote.source_names())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let member = insert_member_row(
            &mut tx,
            &Member {
                id: Uuid::new_v4(),
                email: promoted.email.clone(),
                company_name: promoted.company_name.clone(),
                category_id: promoted.category_id,
                slot_number,
                active: true,
                approved_at: now,
                deactivated_at: None,
            },
        )
        .await?;

        record(
            &mut tx,
            self.capacity,
            AuditAction::Promoted,
            AuditSubject {
                category_id: Some(promoted.category_id),
                entry_id: Some(promoted.id),
                member_id: Some(member.id),
                actor,
            },
            Some(json!({ "slot_number": slot_number })),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(Outcome::Applied(Admission {
            member,
            entry: promoted,
        }))
    }

    async fn insert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Member, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        if !category_exists(&mut tx, member.category_id).await? {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                member.category_id
            )));
        }
        if open_entry_email(&mut tx, &member.email).await? {
            return Err(WaitlistError::Conflict(format!(
                "{} has an open waitlist entry; register through the waitlist",
                member.email
            )));
        }
        let slot_number =
            claim_slot(&mut tx, self.capacity, &member.email, SlotClaim::Direct).await?;

        let created = insert_member_row(
            &mut tx,
            &Member {
                id: Uuid::new_v4(),
                email: member.email,
                company_name: member.company_name,
                category_id: member.category_id,
                slot_number,
                active: true,
                approved_at: now,
                deactivated_at: None,
            },
        )
        .await?;

        record(
            &mut tx,
            self.capacity,
            AuditAction::MemberAdmitted,
            AuditSubject {
                category_id: Some(created.category_id),
                entry_id: None,
                member_id: Some(created.id),
                actor: member.actor,
            },
            Some(json!({ "slot_number": slot_number })),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn deactivate_member(
        &self,
        member_id: MemberId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Member>, WaitlistError> {
        let mut tx = self.begin_locked().await?;
        let current: Member = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM wl_members WHERE id = $1 FOR UPDATE",
        )
        .bind(member_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| WaitlistError::NotFound(format!("member {member_id}")))?
        .try_into()?;
        if !current.active {
            return Ok(Outcome::AlreadyHandled);
        }

        let deactivated: Member = sqlx::query_as::<_, MemberRow>(
            "UPDATE wl_members SET active = FALSE, deactivated_at = $2
             WHERE id = $1
             RETURNING *",
        )
        .bind(member_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        record(
            &mut tx,
            self.capacity,
            AuditAction::MemberDeactivated,
            AuditSubject {
                category_id: Some(deactivated.category_id),
                entry_id: None,
                member_id: Some(deactivated.id),
                actor,
            },
            Some(json!({ "released_slot": deactivated.slot_number })),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(Outcome::Applied(deactivated))
    }

    async fn entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, WaitlistError> {
        sqlx::query_as::<_, EntryRow>("SELECT * FROM wl_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()
    }

    async fn member(&self, id: MemberId) -> Result<Option<Member>, WaitlistError> {
        sqlx::query_as::<_, MemberRow>("SELECT * FROM wl_members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Member::try_from)
            .transpose()
    }

    async fn active_members(&self) -> Result<Vec<Member>, WaitlistError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM wl_members WHERE active ORDER BY slot_number",
        )
        .fetch_all(&self.pool)
        .await?;
        members_from(rows)
    }

    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let sql = format!(
            "SELECT * FROM wl_entries
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR category_id = $2)
             ORDER BY {ENTRY_ORDER}"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(filter.status.map(WaitlistStatus::as_str))
            .bind(filter.category_id)
            .fetch_all(&self.pool)
            .await?;
        entries_from(rows)
    }

    async fn waiting_rank(&self, position: i64) -> Result<u32, WaitlistError> {
        let ahead = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM wl_entries WHERE status = $2 AND position < $1",
        )
        .bind(position)
        .bind(WaitlistStatus::Waiting.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(ahead).unwrap_or(u32::MAX).saturating_add(1))
    }

    async fn audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, WaitlistError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, action, total_capacity, current_count, available_slots, waitlist_count,
                    notified_count, is_full, category_id, related_entry_id, related_member_id,
                    actor, metadata, created_at
             FROM wl_audit_log
             WHERE ($1::text IS NULL OR action = $1)
               AND ($2::uuid IS NULL OR related_entry_id = $2)
               AND ($3::uuid IS NULL OR related_member_id = $3)
             ORDER BY seq DESC
             LIMIT $4",
        )
        .bind(query.action.map(AuditAction::as_str))
        .bind(query.entry_id)
        .bind(query.member_id)
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}
