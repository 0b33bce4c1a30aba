use chrono::{DateTime, Datelike, TimeZone, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use courtside_shared::errors::AppResult;
use courtside_shared::types::auth::{SubscriptionTier, UserRole};

use crate::models::User;
use crate::schema::{highlights, users};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Month-over-month change, one decimal. A zero baseline reads as 100% growth (or 0 if still zero).
pub fn pct_change(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    let raw = (current - previous) as f64 / previous as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `[previous month start, current month start, next month start)` around `now`.
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>, DateTime<Utc>) {
    let (y, m) = (now.year(), now.month());
    let (py, pm) = if m == 1 { (y - 1, 12) } else { (y, m - 1) };
    let (ny, nm) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
    (month_start(py, pm), month_start(y, m), month_start(ny, nm))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CountWithChange {
    pub count: i64,
    pub pct_change: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MonthlyStat {
    pub month: &'static str,
    pub month_number: u32,
    pub new_users: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: CountWithChange,
    pub total_athletes: CountWithChange,
    pub video_uploads: CountWithChange,
    pub monthly_stats: Vec<MonthlyStat>,
    pub total_new_users: i64,
}

pub fn monthly_buckets(created: &[DateTime<Utc>], year: i32) -> Vec<MonthlyStat> {
    let mut counts = [0i64; 12];
    for ts in created.iter().filter(|ts| ts.year() == year) {
        counts[ts.month0() as usize] += 1;
    }
    MONTH_NAMES
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (name, new_users))| MonthlyStat {
            month: name,
            month_number: i as u32 + 1,
            new_users,
        })
        .collect()
}

fn user_counts(conn: &mut PgConnection, role: Option<UserRole>, now: DateTime<Utc>) -> AppResult<CountWithChange> {
    let (prev, cur, next) = month_bounds(now);

    let base = || {
        let mut q = users::table.filter(users::is_deleted.eq(false)).into_boxed();
        if let Some(role) = role {
            q = q.filter(users::role.eq(role.as_str()));
        }
        q
    };

    let count: i64 = base().count().get_result(conn)?;
    let this_month: i64 = base()
        .filter(users::created_at.ge(cur))
        .filter(users::created_at.lt(next))
        .count()
        .get_result(conn)?;
    let last_month: i64 = base()
        .filter(users::created_at.ge(prev))
        .filter(users::created_at.lt(cur))
        .count()
        .get_result(conn)?;

    Ok(CountWithChange { count, pct_change: pct_change(this_month, last_month) })
}

fn upload_counts(conn: &mut PgConnection, now: DateTime<Utc>) -> AppResult<CountWithChange> {
    let (prev, cur, next) = month_bounds(now);

    let count: i64 = highlights::table.count().get_result(conn)?;
    let this_month: i64 = highlights::table
        .filter(highlights::created_at.ge(cur))
        .filter(highlights::created_at.lt(next))
        .count()
        .get_result(conn)?;
    let last_month: i64 = highlights::table
        .filter(highlights::created_at.ge(prev))
        .filter(highlights::created_at.lt(cur))
        .count()
        .get_result(conn)?;

    Ok(CountWithChange { count, pct_change: pct_change(this_month, last_month) })
}

pub fn dashboard_stats(conn: &mut PgConnection) -> AppResult<DashboardStats> {
    let now = Utc::now();
    let year = now.year();

    let created: Vec<DateTime<Utc>> = users::table
        .filter(users::is_deleted.eq(false))
        .filter(users::created_at.ge(month_start(year, 1)))
        .filter(users::created_at.lt(month_start(year + 1, 1)))
        .select(users::created_at)
        .load(conn)?;
    let monthly_stats = monthly_buckets(&created, year);
    let total_new_users = monthly_stats.iter().map(|m| m.new_users).sum();

    Ok(DashboardStats {
        total_users: user_counts(conn, None, now)?,
        total_athletes: user_counts(conn, Some(UserRole::Athlete), now)?,
        video_uploads: upload_counts(conn, now)?,
        monthly_stats,
        total_new_users,
    })
}

#[derive(Debug)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

/// Non-deleted users matching role and a free-text term, newest first, plus the total.
pub fn search_users(conn: &mut PgConnection, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
    let build = || {
        let mut q = users::table
            .filter(users::is_deleted.eq(false))
            .into_boxed();
        if let Some(role) = query.role {
            q = q.filter(users::role.eq(role.as_str()));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{term}%");
            let text_match = users::athlete_full_name
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern.clone()))
                .or(users::city.ilike(pattern.clone()))
                .or(users::state.ilike(pattern));
            q = match Uuid::parse_str(term) {
                Ok(id) => q.filter(text_match.or(users::id.eq(id).nullable())),
                Err(_) => q.filter(text_match),
            };
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let limit = query.limit.clamp(1, 100);
    let offset = (query.page.max(1) - 1) * limit;
    let items = build()
        .order(users::created_at.desc())
        .offset(offset)
        .limit(limit)
        .select(User::as_select())
        .load(conn)?;
    Ok((items, total))
}

/// Subscriber counts per tier with every tier present.
pub fn tier_counts(conn: &mut PgConnection) -> AppResult<Vec<(SubscriptionTier, i64)>> {
    let rows: Vec<(String, i64)> = users::table
        .filter(users::is_deleted.eq(false))
        .group_by(users::subscribe_status)
        .select((users::subscribe_status, diesel::dsl::count_star()))
        .load(conn)?;
    Ok(fill_tiers(rows))
}

pub fn fill_tiers(rows: Vec<(String, i64)>) -> Vec<(SubscriptionTier, i64)> {
    SubscriptionTier::ALL
        .iter()
        .map(|tier| {
            let count = rows
                .iter()
                .filter(|(status, _)| status.parse::<SubscriptionTier>().ok() == Some(*tier))
                .map(|(_, n)| n)
                .sum();
            (*tier, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_change_handles_zero_baseline() {
        assert_eq!(pct_change(0, 0), 0.0);
        assert_eq!(pct_change(5, 0), 100.0);
    }

    #[test]
    fn pct_change_rounds_to_one_decimal() {
        assert_eq!(pct_change(15, 10), 50.0);
        assert_eq!(pct_change(1, 3), -66.7);
        assert_eq!(pct_change(4, 3), 33.3);
    }

    #[test]
    fn month_bounds_wrap_years() {
        let jan = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let (prev, cur, next) = month_bounds(jan);
        assert_eq!(prev, Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(cur, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());

        let dec = Utc.with_ymd_and_hms(2024, 12, 3, 0, 0, 0).unwrap();
        assert_eq!(month_bounds(dec).2, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_buckets_cover_the_whole_year() {
        let dates = vec![
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 30, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 4, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 7, 4, 0, 0, 0).unwrap(),
        ];
        let stats = monthly_buckets(&dates, 2024);
        assert_eq!(stats.len(), 12);
        assert_eq!(stats[0], MonthlyStat { month: "Jan", month_number: 1, new_users: 2 });
        assert_eq!(stats[6].new_users, 1);
        assert_eq!(stats[11].month, "Dec");
    }

    #[test]
    fn tiers_are_zero_filled() {
        let counts = fill_tiers(vec![("PRO".into(), 3), ("free".into(), 7)]);
        assert_eq!(
            counts,
            vec![
                (SubscriptionTier::Free, 7),
                (SubscriptionTier::Pro, 3),
                (SubscriptionTier::Elite, 0),
                (SubscriptionTier::Comped, 0),
            ]
        );
    }
}
