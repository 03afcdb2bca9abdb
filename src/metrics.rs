use crate::calendar::{self, PeriodBreakdown};
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const ACTIVITY_WINDOW_DAYS: i64 = 30;
pub const PROMOTION_WINDOW_DAYS: i64 = 90;
pub const MONTHLY_PROMOTION_WINDOW_DAYS: i64 = 365;

const READY_MIN_ACTIVITY: i64 = 10;
const READY_RECENT_DAYS: i64 = 7;
const RANKING_LIMIT: usize = 10;

/// Page ceilings for jilid 1..=8. A progress row's halaman may never
/// exceed the ceiling of its current jilid.
const JILID_PAGE_CEILINGS: [i64; 8] = [32, 32, 32, 32, 32, 40, 44, 44];

pub fn jilid_page_ceiling(jilid: i64) -> Option<i64> {
    if (1..=8).contains(&jilid) {
        Some(JILID_PAGE_CEILINGS[(jilid - 1) as usize])
    } else {
        None
    }
}

pub const JILID_MAX: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Proses,
    Diajukan,
    Diterima,
    Ditolak,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Proses => "Proses",
            ProgressStatus::Diajukan => "Diajukan",
            ProgressStatus::Diterima => "Diterima",
            ProgressStatus::Ditolak => "Ditolak",
        }
    }

    /// Older workspaces wrote `Lulus` for approved promotions.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Proses" => Some(ProgressStatus::Proses),
            "Diajukan" => Some(ProgressStatus::Diajukan),
            "Diterima" | "Lulus" => Some(ProgressStatus::Diterima),
            "Ditolak" => Some(ProgressStatus::Ditolak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl MetricsError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<rusqlite::Error> for MetricsError {
    fn from(e: rusqlite::Error) -> Self {
        MetricsError::new("db_query_failed", e.to_string())
    }
}

/// Filters accepted by both dashboards. Absent or null fields fall back
/// to the documented trailing-window defaults at query time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilters {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub class_level: Option<i64>,
    pub group_id: Option<String>,
}

impl DashboardFilters {
    /// Canonical `key=value` pairs for cache-key hashing; only present
    /// fields participate, so `{}` and all-null filters hash alike.
    pub fn cache_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(d) = self.date_from {
            pairs.push(("date_from".to_string(), iso(d)));
        }
        if let Some(d) = self.date_to {
            pairs.push(("date_to".to_string(), iso(d)));
        }
        if let Some(l) = self.class_level {
            pairs.push(("class_level".to_string(), l.to_string()));
        }
        if let Some(g) = &self.group_id {
            pairs.push(("group_id".to_string(), g.clone()));
        }
        pairs
    }
}

pub fn parse_dashboard_filters(
    raw: Option<&serde_json::Value>,
) -> Result<DashboardFilters, MetricsError> {
    let Some(raw) = raw else {
        return Ok(DashboardFilters::default());
    };
    if raw.is_null() {
        return Ok(DashboardFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(MetricsError::new("bad_filters", "filters must be an object"));
    };

    let parse_date = |key: &str, alt: &str| -> Result<Option<NaiveDate>, MetricsError> {
        match obj.get(key).or_else(|| obj.get(alt)) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(None),
            Some(v) => {
                let Some(s) = v.as_str() else {
                    return Err(MetricsError::new(
                        "bad_filters",
                        format!("filters.{} must be a YYYY-MM-DD string", key),
                    ));
                };
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| {
                        MetricsError::new(
                            "bad_filters",
                            format!("filters.{} must be a YYYY-MM-DD string", key),
                        )
                    })
            }
        }
    };

    let class_level = match obj.get("classLevel").or_else(|| obj.get("class_level")) {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(v.as_i64().ok_or_else(|| {
            MetricsError::new("bad_filters", "filters.classLevel must be an integer")
        })?),
    };
    let group_id = match obj.get("groupId").or_else(|| obj.get("group_id")) {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| {
                    MetricsError::new("bad_filters", "filters.groupId must be a string")
                })?
                .to_string(),
        ),
    };

    Ok(DashboardFilters {
        date_from: parse_date("dateFrom", "date_from")?,
        date_to: parse_date("dateTo", "date_to")?,
        class_level,
        group_id,
    })
}

fn iso(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `[from, to]` for a metric with the given default trailing length.
fn resolve_window(
    filters: &DashboardFilters,
    today: NaiveDate,
    default_days: i64,
) -> (NaiveDate, NaiveDate) {
    match (filters.date_from, filters.date_to) {
        (Some(f), Some(t)) if f <= t => (f, t),
        (Some(f), Some(t)) => (t, f),
        (Some(f), None) => (f, today.max(f)),
        (None, Some(t)) => (t - Duration::days(default_days - 1), t),
        (None, None) => calendar::trailing_window(today, default_days),
    }
}

fn log_date(raw: &str) -> Option<NaiveDate> {
    raw.get(0..10)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

// ---------------------------------------------------------------------------
// Teacher dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorizationTarget {
    pub surah: String,
    pub verse_start: Option<i64>,
    pub verse_end: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMeta {
    pub group_id: String,
    pub name: String,
    pub level: i64,
    pub student_count: i64,
    pub teacher_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<MemorizationTarget>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDayActivity {
    pub student_id: String,
    pub name: String,
    pub halaman: i64,
    pub hafalan: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayActivity {
    pub date: NaiveDate,
    pub students: Vec<StudentDayActivity>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JilidBucket {
    pub jilid: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HafalanCount {
    pub student_id: String,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromotionFunnel {
    pub proposed: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub window_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagesToday {
    pub date: NaiveDate,
    pub count: i64,
    pub substituted_friday: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCandidate {
    pub student_id: String,
    pub name: String,
    pub activity_count: i64,
    pub last_activity: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAverages {
    pub pages_per_active_day: f64,
    pub hafalan_per_active_day: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherMetrics {
    pub group: GroupMeta,
    pub period: PeriodBreakdown,
    pub daily_activity: Vec<DayActivity>,
    pub jilid_distribution: Vec<JilidBucket>,
    pub hafalan_counts: Vec<HafalanCount>,
    pub promotion_funnel: PromotionFunnel,
    pub pages_read_today: PagesToday,
    pub ready_for_promotion: Vec<PromotionCandidate>,
    pub averages: ActivityAverages,
}

/// Domain outcomes for the teacher dashboard. A teacher without a group
/// or with an empty group is a first-class result, not an error.
#[derive(Debug, Clone)]
pub enum TeacherDashboard {
    NoGroup,
    NoStudents { group: GroupMeta },
    Ready(Box<TeacherMetrics>),
}

struct StudentRow {
    id: String,
    name: String,
}

struct ProgressRow {
    student_id: String,
    jilid: i64,
    status: Option<ProgressStatus>,
}

struct LogRow {
    student_id: String,
    kind: String,
    recorded_at: String,
}

fn in_placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn load_group_students(
    conn: &Connection,
    group_id: &str,
    class_level: Option<i64>,
) -> Result<Vec<StudentRow>, MetricsError> {
    let mut sql = String::from(
        "SELECT s.id, s.name
         FROM students s
         JOIN classes c ON c.id = s.class_id
         WHERE s.group_id = ?",
    );
    let mut values: Vec<Value> = vec![Value::Text(group_id.to_string())];
    if let Some(level) = class_level {
        sql.push_str(" AND c.level = ?");
        values.push(Value::Integer(level));
    }
    sql.push_str(" ORDER BY s.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_progress_rows(
    conn: &Connection,
    student_ids: &[String],
) -> Result<Vec<ProgressRow>, MetricsError> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT student_id, jilid, status FROM progress WHERE student_id IN ({})",
        in_placeholders(student_ids.len())
    );
    let values: Vec<Value> = student_ids.iter().map(|s| Value::Text(s.clone())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            let raw_status: String = r.get(2)?;
            Ok(ProgressRow {
                student_id: r.get(0)?,
                jilid: r.get(1)?,
                status: ProgressStatus::parse(&raw_status),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_window_logs(
    conn: &Connection,
    student_ids: &[String],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<LogRow>, MetricsError> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT p.student_id, a.type, a.recorded_at
         FROM activity_logs a
         JOIN progress p ON p.id = a.progress_id
         WHERE p.student_id IN ({})
           AND date(a.recorded_at) BETWEEN ? AND ?",
        in_placeholders(student_ids.len())
    );
    let mut values: Vec<Value> = student_ids.iter().map(|s| Value::Text(s.clone())).collect();
    values.push(Value::Text(iso(from)));
    values.push(Value::Text(iso(to)));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(LogRow {
                student_id: r.get(0)?,
                kind: r.get(1)?,
                recorded_at: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn teacher_metrics(
    conn: &Connection,
    teacher_id: &str,
    filters: &DashboardFilters,
    today: NaiveDate,
) -> Result<TeacherDashboard, MetricsError> {
    // An unknown teacher is an error, not an empty dashboard; `NoGroup`
    // is reserved for teachers that exist without an assignment.
    let known: Option<i64> = conn
        .query_row("SELECT 1 FROM employees WHERE id = ?", [teacher_id], |r| {
            r.get(0)
        })
        .optional()?;
    if known.is_none() {
        return Err(MetricsError::new("not_found", "teacher not found"));
    }

    let group = {
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.level, e.name,
                    g.target_surah, g.target_verse_start, g.target_verse_end
             FROM btq_groups g
             JOIN employees e ON e.id = g.teacher_id
             WHERE g.teacher_id = ?",
        )?;
        let mut rows = stmt.query([teacher_id])?;
        match rows.next()? {
            Some(r) => {
                let target_surah: Option<String> = r.get(4)?;
                GroupMeta {
                    group_id: r.get(0)?,
                    name: r.get(1)?,
                    level: r.get(2)?,
                    student_count: 0,
                    teacher_name: r.get(3)?,
                    target: target_surah.map(|surah| MemorizationTarget {
                        surah,
                        verse_start: r.get(5).ok().flatten(),
                        verse_end: r.get(6).ok().flatten(),
                    }),
                }
            }
            None => return Ok(TeacherDashboard::NoGroup),
        }
    };

    let students = load_group_students(conn, &group.group_id, filters.class_level)?;
    if students.is_empty() {
        return Ok(TeacherDashboard::NoStudents { group });
    }
    let mut group = group;
    group.student_count = students.len() as i64;

    let student_ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
    let names: HashMap<&str, &str> = students
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();

    let holidays = calendar::load_holidays(conn)?;
    let (from, to) = resolve_window(filters, today, ACTIVITY_WINDOW_DAYS);
    let period = calendar::period_breakdown(from, to, &holidays);

    let progress_rows = load_progress_rows(conn, &student_ids)?;
    let logs = load_window_logs(conn, &student_ids, from, to)?;

    // Daily buckets: date -> student -> (halaman, hafalan). Only active
    // (business) days participate; the window totals below do not drop
    // holiday activity.
    let mut daily: BTreeMap<NaiveDate, HashMap<&str, (i64, i64)>> = BTreeMap::new();
    let mut total_pages = 0i64;
    let mut total_hafalan = 0i64;
    let mut hafalan_per_student: HashMap<&str, i64> = HashMap::new();
    for log in &logs {
        let is_hafalan = log.kind == "hafalan";
        if is_hafalan {
            total_hafalan += 1;
            *hafalan_per_student.entry(log.student_id.as_str()).or_insert(0) += 1;
        } else {
            total_pages += 1;
        }
        let Some(date) = log_date(&log.recorded_at) else {
            continue;
        };
        if !calendar::is_business_day(date, &holidays) {
            continue;
        }
        let cell = daily
            .entry(date)
            .or_default()
            .entry(log.student_id.as_str())
            .or_insert((0, 0));
        if is_hafalan {
            cell.1 += 1;
        } else {
            cell.0 += 1;
        }
    }
    let daily_activity: Vec<DayActivity> = daily
        .into_iter()
        .map(|(date, per_student)| {
            let mut rows: Vec<StudentDayActivity> = per_student
                .into_iter()
                .map(|(sid, (halaman, hafalan))| StudentDayActivity {
                    student_id: sid.to_string(),
                    name: names.get(sid).copied().unwrap_or("").to_string(),
                    halaman,
                    hafalan,
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.student_id.cmp(&b.student_id)));
            DayActivity {
                date,
                students: rows,
            }
        })
        .collect();

    let mut jilid_counts: BTreeMap<i64, i64> = BTreeMap::new();
    for p in &progress_rows {
        *jilid_counts.entry(p.jilid).or_insert(0) += 1;
    }
    let jilid_distribution: Vec<JilidBucket> = jilid_counts
        .into_iter()
        .map(|(jilid, count)| JilidBucket { jilid, count })
        .collect();

    let mut hafalan_counts: Vec<HafalanCount> = hafalan_per_student
        .into_iter()
        .map(|(sid, count)| HafalanCount {
            student_id: sid.to_string(),
            name: names.get(sid).copied().unwrap_or("").to_string(),
            count,
        })
        .collect();
    hafalan_counts.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));

    let promotion_funnel = promotion_funnel(conn, &student_ids, filters, today)?;
    let pages_read_today = pages_read_today(conn, &student_ids, today)?;
    let ready_for_promotion =
        ready_for_promotion(conn, &student_ids, &names, &progress_rows, today)?;

    let averages = if period.active_days > 0 {
        ActivityAverages {
            pages_per_active_day: total_pages as f64 / period.active_days as f64,
            hafalan_per_active_day: total_hafalan as f64 / period.active_days as f64,
        }
    } else {
        ActivityAverages {
            pages_per_active_day: 0.0,
            hafalan_per_active_day: 0.0,
        }
    };

    Ok(TeacherDashboard::Ready(Box::new(TeacherMetrics {
        group,
        period,
        daily_activity,
        jilid_distribution,
        hafalan_counts,
        promotion_funnel,
        pages_read_today,
        ready_for_promotion,
        averages,
    })))
}

fn promotion_funnel(
    conn: &Connection,
    student_ids: &[String],
    filters: &DashboardFilters,
    today: NaiveDate,
) -> Result<PromotionFunnel, MetricsError> {
    let (from, to) = resolve_window(filters, today, PROMOTION_WINDOW_DAYS);
    let sql = format!(
        "SELECT status, COUNT(*)
         FROM progress
         WHERE student_id IN ({})
           AND date(updated_at) BETWEEN ? AND ?
         GROUP BY status",
        in_placeholders(student_ids.len())
    );
    let mut values: Vec<Value> = student_ids.iter().map(|s| Value::Text(s.clone())).collect();
    values.push(Value::Text(iso(from)));
    values.push(Value::Text(iso(to)));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut funnel = PromotionFunnel {
        proposed: 0,
        accepted: 0,
        rejected: 0,
        window_days: (to - from).num_days() + 1,
    };
    for (raw, count) in rows {
        // `Proses` and unknown labels stay out of the funnel.
        match ProgressStatus::parse(&raw) {
            Some(ProgressStatus::Diajukan) => funnel.proposed += count,
            Some(ProgressStatus::Diterima) => funnel.accepted += count,
            Some(ProgressStatus::Ditolak) => funnel.rejected += count,
            _ => {}
        }
    }
    Ok(funnel)
}

fn pages_read_today(
    conn: &Connection,
    student_ids: &[String],
    today: NaiveDate,
) -> Result<PagesToday, MetricsError> {
    let effective = calendar::previous_weekday(today);
    let sql = format!(
        "SELECT COUNT(*)
         FROM activity_logs a
         JOIN progress p ON p.id = a.progress_id
         WHERE a.type = 'halaman'
           AND p.student_id IN ({})
           AND date(a.recorded_at) = ?",
        in_placeholders(student_ids.len())
    );
    let mut values: Vec<Value> = student_ids.iter().map(|s| Value::Text(s.clone())).collect();
    values.push(Value::Text(iso(effective)));
    let count: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
    Ok(PagesToday {
        date: effective,
        count,
        substituted_friday: effective != today,
    })
}

fn ready_for_promotion(
    conn: &Connection,
    student_ids: &[String],
    names: &HashMap<&str, &str>,
    progress_rows: &[ProgressRow],
    today: NaiveDate,
) -> Result<Vec<PromotionCandidate>, MetricsError> {
    let proposed: HashSet<&str> = progress_rows
        .iter()
        .filter(|p| p.status == Some(ProgressStatus::Diajukan))
        .map(|p| p.student_id.as_str())
        .collect();

    let sql = format!(
        "SELECT p.student_id, COUNT(*), MAX(date(a.recorded_at))
         FROM activity_logs a
         JOIN progress p ON p.id = a.progress_id
         WHERE p.student_id IN ({})
         GROUP BY p.student_id
         HAVING COUNT(*) >= ?",
        in_placeholders(student_ids.len())
    );
    let mut values: Vec<Value> = student_ids.iter().map(|s| Value::Text(s.clone())).collect();
    values.push(Value::Integer(READY_MIN_ACTIVITY));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let recent_floor = today - Duration::days(READY_RECENT_DAYS - 1);
    let mut out = Vec::new();
    for (sid, count, last_raw) in rows {
        if proposed.contains(sid.as_str()) {
            continue;
        }
        let Some(last) = log_date(&last_raw) else {
            continue;
        };
        if last < recent_floor || last > today {
            continue;
        }
        out.push(PromotionCandidate {
            student_id: sid.clone(),
            name: names.get(sid.as_str()).copied().unwrap_or("").to_string(),
            activity_count: count,
            last_activity: last,
        });
    }
    out.sort_by(|a, b| {
        b.activity_count
            .cmp(&a.activity_count)
            .then(a.name.cmp(&b.name))
    });
    Ok(out)
}

// ---------------------------------------------------------------------------
// Coordinator dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDay {
    pub date: NaiveDate,
    pub halaman: i64,
    pub hafalan: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDailyActivity {
    pub teacher_id: String,
    pub teacher_name: String,
    pub days: Vec<TeacherDay>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPromotionBucket {
    pub year: i32,
    pub month: u32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRank {
    pub teacher_id: String,
    pub teacher_name: String,
    pub activity_count: i64,
    pub active_students: i64,
    pub active_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JilidByLevel {
    pub class_level: i64,
    pub jilid: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HafalanLevelStats {
    pub class_level: i64,
    pub total: i64,
    pub students: i64,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HafalanStats {
    pub total: i64,
    pub students_with_hafalan: i64,
    pub average_per_student: f64,
    pub by_class_level: Vec<HafalanLevelStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallTotals {
    pub students: i64,
    pub teachers_with_group: i64,
    pub groups: i64,
    pub classes: i64,
    pub pending_promotions: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorMetrics {
    pub period: PeriodBreakdown,
    pub teacher_daily_activity: Vec<TeacherDailyActivity>,
    pub monthly_promotions: Vec<MonthlyPromotionBucket>,
    pub teacher_ranking: Vec<TeacherRank>,
    pub jilid_by_class_level: Vec<JilidByLevel>,
    pub hafalan_stats: HafalanStats,
    pub totals: OverallTotals,
}

/// Appends the shared student-scope predicates for class level / group
/// filters; assumes a `students s` / `classes c` join is in scope.
fn push_scope(sql: &mut String, values: &mut Vec<Value>, filters: &DashboardFilters) {
    if let Some(level) = filters.class_level {
        sql.push_str(" AND c.level = ?");
        values.push(Value::Integer(level));
    }
    if let Some(gid) = &filters.group_id {
        sql.push_str(" AND s.group_id = ?");
        values.push(Value::Text(gid.clone()));
    }
}

pub fn coordinator_metrics(
    conn: &Connection,
    filters: &DashboardFilters,
    today: NaiveDate,
) -> Result<CoordinatorMetrics, MetricsError> {
    let holidays = calendar::load_holidays(conn)?;
    let (from, to) = resolve_window(filters, today, ACTIVITY_WINDOW_DAYS);
    let period = calendar::period_breakdown(from, to, &holidays);

    // One pass over the window's logs feeds both the per-teacher daily
    // breakdown and the ranking.
    let mut sql = String::from(
        "SELECT g.teacher_id, e.name, s.id, a.type, a.recorded_at
         FROM activity_logs a
         JOIN progress p ON p.id = a.progress_id
         JOIN students s ON s.id = p.student_id
         JOIN classes c ON c.id = s.class_id
         JOIN btq_groups g ON g.id = s.group_id
         JOIN employees e ON e.id = g.teacher_id
         WHERE date(a.recorded_at) BETWEEN ? AND ?",
    );
    let mut values: Vec<Value> = vec![Value::Text(iso(from)), Value::Text(iso(to))];
    push_scope(&mut sql, &mut values, filters);

    struct TeacherAgg {
        name: String,
        days: BTreeMap<NaiveDate, (i64, i64)>,
        activity_count: i64,
        students: HashSet<String>,
        active_dates: HashSet<NaiveDate>,
    }
    let mut per_teacher: BTreeMap<String, TeacherAgg> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (tid, tname, sid, kind, recorded_at) in rows {
            let agg = per_teacher.entry(tid).or_insert_with(|| TeacherAgg {
                name: tname.clone(),
                days: BTreeMap::new(),
                activity_count: 0,
                students: HashSet::new(),
                active_dates: HashSet::new(),
            });
            agg.activity_count += 1;
            agg.students.insert(sid);
            if let Some(date) = log_date(&recorded_at) {
                if calendar::is_business_day(date, &holidays) {
                    agg.active_dates.insert(date);
                    let cell = agg.days.entry(date).or_insert((0, 0));
                    if kind == "hafalan" {
                        cell.1 += 1;
                    } else {
                        cell.0 += 1;
                    }
                }
            }
        }
    }

    let teacher_daily_activity: Vec<TeacherDailyActivity> = per_teacher
        .iter()
        .map(|(tid, agg)| TeacherDailyActivity {
            teacher_id: tid.clone(),
            teacher_name: agg.name.clone(),
            days: agg
                .days
                .iter()
                .map(|(date, (halaman, hafalan))| TeacherDay {
                    date: *date,
                    halaman: *halaman,
                    hafalan: *hafalan,
                })
                .collect(),
        })
        .collect();

    let mut teacher_ranking: Vec<TeacherRank> = per_teacher
        .iter()
        .map(|(tid, agg)| TeacherRank {
            teacher_id: tid.clone(),
            teacher_name: agg.name.clone(),
            activity_count: agg.activity_count,
            active_students: agg.students.len() as i64,
            active_days: agg.active_dates.len() as i64,
        })
        .collect();
    teacher_ranking.sort_by(|a, b| {
        b.activity_count
            .cmp(&a.activity_count)
            .then(a.teacher_name.cmp(&b.teacher_name))
    });
    teacher_ranking.truncate(RANKING_LIMIT);

    let monthly_promotions = monthly_promotions(conn, filters, today)?;
    let jilid_by_class_level = jilid_by_class_level(conn, filters)?;
    let hafalan_stats = hafalan_stats(conn, filters, from, to)?;
    let totals = overall_totals(conn, filters)?;

    Ok(CoordinatorMetrics {
        period,
        teacher_daily_activity,
        monthly_promotions,
        teacher_ranking,
        jilid_by_class_level,
        hafalan_stats,
        totals,
    })
}

/// Approved promotions per calendar month. Counted from the review log
/// because approved progress rows fold back to `Proses` on the next
/// recorded activity.
fn monthly_promotions(
    conn: &Connection,
    filters: &DashboardFilters,
    today: NaiveDate,
) -> Result<Vec<MonthlyPromotionBucket>, MetricsError> {
    let (from, to) = resolve_window(filters, today, MONTHLY_PROMOTION_WINDOW_DAYS);
    let mut sql = String::from(
        "SELECT pr.reviewed_at
         FROM promotion_reviews pr
         JOIN progress p ON p.id = pr.progress_id
         JOIN students s ON s.id = p.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE pr.decision = 'Diterima'
           AND date(pr.reviewed_at) BETWEEN ? AND ?",
    );
    let mut values: Vec<Value> = vec![Value::Text(iso(from)), Value::Text(iso(to))];
    push_scope(&mut sql, &mut values, filters);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut buckets: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    for raw in rows {
        if let Some(date) = log_date(&raw) {
            *buckets.entry((date.year(), date.month())).or_insert(0) += 1;
        }
    }
    Ok(buckets
        .into_iter()
        .map(|((year, month), count)| MonthlyPromotionBucket { year, month, count })
        .collect())
}

fn jilid_by_class_level(
    conn: &Connection,
    filters: &DashboardFilters,
) -> Result<Vec<JilidByLevel>, MetricsError> {
    let mut sql = String::from(
        "SELECT c.level, p.jilid, COUNT(*)
         FROM progress p
         JOIN students s ON s.id = p.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE 1 = 1",
    );
    let mut values: Vec<Value> = Vec::new();
    push_scope(&mut sql, &mut values, filters);
    sql.push_str(" GROUP BY c.level, p.jilid ORDER BY c.level, p.jilid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(JilidByLevel {
                class_level: r.get(0)?,
                jilid: r.get(1)?,
                count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn hafalan_stats(
    conn: &Connection,
    filters: &DashboardFilters,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HafalanStats, MetricsError> {
    let mut sql = String::from(
        "SELECT c.level, s.id
         FROM activity_logs a
         JOIN progress p ON p.id = a.progress_id
         JOIN students s ON s.id = p.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE a.type = 'hafalan'
           AND date(a.recorded_at) BETWEEN ? AND ?",
    );
    let mut values: Vec<Value> = vec![Value::Text(iso(from)), Value::Text(iso(to))];
    push_scope(&mut sql, &mut values, filters);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut total = 0i64;
    let mut students_with: HashSet<String> = HashSet::new();
    let mut by_level: BTreeMap<i64, (i64, HashSet<String>)> = BTreeMap::new();
    for (level, sid) in rows {
        total += 1;
        students_with.insert(sid.clone());
        let entry = by_level.entry(level).or_insert_with(|| (0, HashSet::new()));
        entry.0 += 1;
        entry.1.insert(sid);
    }

    // Denominators come from the scoped student population, not just the
    // students who logged hafalan.
    let mut sql = String::from(
        "SELECT c.level, COUNT(*)
         FROM students s
         JOIN classes c ON c.id = s.class_id
         WHERE 1 = 1",
    );
    let mut values: Vec<Value> = Vec::new();
    push_scope(&mut sql, &mut values, filters);
    sql.push_str(" GROUP BY c.level");
    let mut stmt = conn.prepare(&sql)?;
    let level_counts: HashMap<i64, i64> = stmt
        .query_map(params_from_iter(values), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    let scoped_students: i64 = level_counts.values().sum();

    let by_class_level: Vec<HafalanLevelStats> = by_level
        .into_iter()
        .map(|(level, (level_total, level_students))| {
            let denom = level_counts.get(&level).copied().unwrap_or(0);
            HafalanLevelStats {
                class_level: level,
                total: level_total,
                students: level_students.len() as i64,
                average: if denom > 0 {
                    level_total as f64 / denom as f64
                } else {
                    0.0
                },
            }
        })
        .collect();

    Ok(HafalanStats {
        total,
        students_with_hafalan: students_with.len() as i64,
        average_per_student: if scoped_students > 0 {
            total as f64 / scoped_students as f64
        } else {
            0.0
        },
        by_class_level,
    })
}

fn overall_totals(
    conn: &Connection,
    filters: &DashboardFilters,
) -> Result<OverallTotals, MetricsError> {
    let mut sql = String::from(
        "SELECT COUNT(*) FROM students s JOIN classes c ON c.id = s.class_id WHERE 1 = 1",
    );
    let mut values: Vec<Value> = Vec::new();
    push_scope(&mut sql, &mut values, filters);
    let students: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;

    let teachers_with_group: i64 = conn.query_row(
        "SELECT COUNT(*) FROM btq_groups WHERE teacher_id IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let groups: i64 = conn.query_row("SELECT COUNT(*) FROM btq_groups", [], |r| r.get(0))?;
    let classes: i64 = conn.query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))?;

    let mut sql = String::from(
        "SELECT COUNT(*)
         FROM progress p
         JOIN students s ON s.id = p.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE p.status = 'Diajukan'",
    );
    let mut values: Vec<Value> = Vec::new();
    push_scope(&mut sql, &mut values, filters);
    let pending_promotions: i64 =
        conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;

    Ok(OverallTotals {
        students,
        teachers_with_group,
        groups,
        classes,
        pending_promotions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date literal")
    }

    fn mem_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn
    }

    struct Seed {
        conn: Connection,
        teacher_id: String,
        group_id: String,
        class_id: String,
    }

    fn seed_base() -> Seed {
        let conn = mem_db();
        conn.execute(
            "INSERT INTO classes(id, name, level) VALUES('c1', '7A', 7)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO employees(id, name, nip) VALUES('t1', 'Ust. Ahmad', 'NIP-1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO btq_groups(id, name, level, teacher_id) VALUES('g1', 'BTQ 3', 3, 't1')",
            [],
        )
        .unwrap();
        Seed {
            conn,
            teacher_id: "t1".into(),
            group_id: "g1".into(),
            class_id: "c1".into(),
        }
    }

    fn add_student(seed: &Seed, sid: &str, name: &str, status: &str, updated_at: &str) {
        seed.conn
            .execute(
                "INSERT INTO students(id, nis, name, class_id, group_id)
                 VALUES(?, ?, ?, ?, ?)",
                (sid, format!("nis-{sid}"), name, &seed.class_id, &seed.group_id),
            )
            .unwrap();
        seed.conn
            .execute(
                "INSERT INTO progress(id, student_id, jilid, halaman, status, updated_at)
                 VALUES(?, ?, 6, 40, ?, ?)",
                (format!("pr-{sid}"), sid, status, updated_at),
            )
            .unwrap();
    }

    fn add_log(seed: &Seed, sid: &str, kind: &str, recorded_at: &str) {
        let id = uuid::Uuid::new_v4().to_string();
        seed.conn
            .execute(
                "INSERT INTO activity_logs(id, progress_id, type, jilid, halaman, recorded_at)
                 VALUES(?, ?, ?, 6, 1, ?)",
                (id, format!("pr-{sid}"), kind, recorded_at),
            )
            .unwrap();
    }

    fn ready(dash: TeacherDashboard) -> TeacherMetrics {
        match dash {
            TeacherDashboard::Ready(m) => *m,
            other => panic!("expected Ready dashboard, got {:?}", other),
        }
    }

    #[test]
    fn teacher_without_group_is_a_typed_outcome() {
        let conn = mem_db();
        conn.execute(
            "INSERT INTO employees(id, name, nip) VALUES('t9', 'Ust. Budi', 'NIP-9')",
            [],
        )
        .unwrap();
        let dash = teacher_metrics(&conn, "t9", &DashboardFilters::default(), d("2025-08-18"))
            .expect("no error");
        assert!(matches!(dash, TeacherDashboard::NoGroup));
    }

    #[test]
    fn unknown_teacher_is_an_error_not_an_empty_dashboard() {
        let conn = mem_db();
        let e = teacher_metrics(
            &conn,
            "no-such-teacher",
            &DashboardFilters::default(),
            d("2025-08-18"),
        )
        .expect_err("unknown teacher must not resolve");
        assert_eq!(e.code, "not_found");
    }

    #[test]
    fn group_without_students_is_a_typed_outcome() {
        let seed = seed_base();
        let dash = teacher_metrics(
            &seed.conn,
            &seed.teacher_id,
            &DashboardFilters::default(),
            d("2025-08-18"),
        )
        .expect("no error");
        match dash {
            TeacherDashboard::NoStudents { group } => {
                assert_eq!(group.group_id, "g1");
                assert_eq!(group.teacher_name, "Ust. Ahmad");
            }
            other => panic!("expected NoStudents, got {:?}", other),
        }
    }

    #[test]
    fn daily_buckets_skip_weekends_and_holidays_but_totals_keep_them() {
        let seed = seed_base();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-01T08:00:00");
        seed.conn
            .execute(
                "INSERT INTO holidays(id, date, label) VALUES('h1', '2025-08-13', 'Libur')",
                [],
            )
            .unwrap();
        add_log(&seed, "s1", "halaman", "2025-08-12T08:00:00"); // Tue
        add_log(&seed, "s1", "halaman", "2025-08-13T08:00:00"); // holiday
        add_log(&seed, "s1", "hafalan", "2025-08-16T08:00:00"); // Sat
        add_log(&seed, "s1", "halaman", "2025-08-18T08:00:00"); // Mon

        let m = ready(
            teacher_metrics(
                &seed.conn,
                &seed.teacher_id,
                &DashboardFilters::default(),
                d("2025-08-18"),
            )
            .unwrap(),
        );
        let dates: Vec<NaiveDate> = m.daily_activity.iter().map(|day| day.date).collect();
        assert_eq!(dates, vec![d("2025-08-12"), d("2025-08-18")]);
        // Window totals still count holiday/weekend activity.
        let hafalan_total: i64 = m.hafalan_counts.iter().map(|h| h.count).sum();
        assert_eq!(hafalan_total, 1);
        // 30-day window ending Mon 2025-08-18: 9 weekend days, 1 weekday holiday.
        assert_eq!(m.period.active_days, 20);
        assert!((m.averages.pages_per_active_day - 3.0 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn funnel_excludes_proses_and_counts_the_three_labels() {
        let seed = seed_base();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-10T08:00:00");
        add_student(&seed, "s2", "Budi", "Diajukan", "2025-08-10T08:00:00");
        add_student(&seed, "s3", "Citra", "Diterima", "2025-08-10T08:00:00");
        add_student(&seed, "s4", "Dewi", "Ditolak", "2025-08-10T08:00:00");
        add_student(&seed, "s5", "Eka", "Lulus", "2025-08-10T08:00:00");
        // Outside the 90-day window: must not count.
        add_student(&seed, "s6", "Fajar", "Diajukan", "2024-01-01T08:00:00");

        let m = ready(
            teacher_metrics(
                &seed.conn,
                &seed.teacher_id,
                &DashboardFilters::default(),
                d("2025-08-18"),
            )
            .unwrap(),
        );
        assert_eq!(
            m.promotion_funnel,
            PromotionFunnel {
                proposed: 1,
                accepted: 2,
                rejected: 1,
                window_days: 90,
            }
        );
        assert!(m.promotion_funnel.proposed + m.promotion_funnel.accepted
            + m.promotion_funnel.rejected
            <= 5);
    }

    #[test]
    fn ready_for_promotion_requires_volume_and_recency_and_not_proposed() {
        let seed = seed_base();
        let today = d("2025-08-18");
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-10T08:00:00");
        add_student(&seed, "s2", "Budi", "Proses", "2025-08-10T08:00:00");
        add_student(&seed, "s3", "Citra", "Diajukan", "2025-08-10T08:00:00");
        add_student(&seed, "s4", "Dewi", "Proses", "2025-08-10T08:00:00");

        // s1: 12 logs, recent -> eligible.
        for i in 0..12 {
            add_log(&seed, "s1", "halaman", &format!("2025-08-{:02}T08:00:00", 4 + i));
        }
        // s2: plenty of volume but stale (at the ceiling, zero recent
        // activity) -> not listed.
        for i in 0..15 {
            add_log(&seed, "s2", "halaman", &format!("2025-06-{:02}T08:00:00", 1 + i));
        }
        // s3: active and high volume but already proposed -> excluded.
        for i in 0..20 {
            add_log(&seed, "s3", "halaman", &format!("2025-08-{:02}T08:00:00", 1 + i % 18));
        }
        // s4: recent but only 3 logs -> below threshold.
        for i in 0..3 {
            add_log(&seed, "s4", "halaman", &format!("2025-08-{:02}T08:00:00", 15 + i));
        }

        let m = ready(
            teacher_metrics(&seed.conn, &seed.teacher_id, &DashboardFilters::default(), today)
                .unwrap(),
        );
        let ids: Vec<&str> = m
            .ready_for_promotion
            .iter()
            .map(|c| c.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1"]);
        assert_eq!(m.ready_for_promotion[0].activity_count, 12);
    }

    #[test]
    fn pages_read_today_substitutes_previous_friday_on_weekends() {
        let seed = seed_base();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-01T08:00:00");
        add_log(&seed, "s1", "halaman", "2025-08-15T08:00:00"); // Fri
        add_log(&seed, "s1", "halaman", "2025-08-15T09:00:00");
        add_log(&seed, "s1", "hafalan", "2025-08-15T10:00:00"); // not a page
        add_log(&seed, "s1", "halaman", "2025-08-17T08:00:00"); // Sun itself

        let sunday = d("2025-08-17");
        let m = ready(
            teacher_metrics(&seed.conn, &seed.teacher_id, &DashboardFilters::default(), sunday)
                .unwrap(),
        );
        assert_eq!(m.pages_read_today.date, d("2025-08-15"));
        assert!(m.pages_read_today.substituted_friday);
        assert_eq!(m.pages_read_today.count, 2);

        let monday = d("2025-08-18");
        let m = ready(
            teacher_metrics(&seed.conn, &seed.teacher_id, &DashboardFilters::default(), monday)
                .unwrap(),
        );
        assert_eq!(m.pages_read_today.date, monday);
        assert!(!m.pages_read_today.substituted_friday);
        assert_eq!(m.pages_read_today.count, 0);
    }

    #[test]
    fn class_level_filter_narrows_the_student_set() {
        let seed = seed_base();
        seed.conn
            .execute(
                "INSERT INTO classes(id, name, level) VALUES('c2', '8A', 8)",
                [],
            )
            .unwrap();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-10T08:00:00");
        seed.conn
            .execute(
                "INSERT INTO students(id, nis, name, class_id, group_id)
                 VALUES('s2', 'nis-s2', 'Budi', 'c2', 'g1')",
                [],
            )
            .unwrap();
        seed.conn
            .execute(
                "INSERT INTO progress(id, student_id, jilid, halaman, status, updated_at)
                 VALUES('pr-s2', 's2', 3, 10, 'Proses', '2025-08-10T08:00:00')",
                [],
            )
            .unwrap();

        let filters = DashboardFilters {
            class_level: Some(8),
            ..Default::default()
        };
        let m = ready(
            teacher_metrics(&seed.conn, &seed.teacher_id, &filters, d("2025-08-18")).unwrap(),
        );
        assert_eq!(m.group.student_count, 1);
        assert_eq!(m.jilid_distribution.len(), 1);
        assert_eq!(m.jilid_distribution[0].jilid, 3);
    }

    #[test]
    fn coordinator_ranks_teachers_and_counts_totals() {
        let seed = seed_base();
        seed.conn
            .execute(
                "INSERT INTO employees(id, name, nip) VALUES('t2', 'Ust. Siti', 'NIP-2')",
                [],
            )
            .unwrap();
        seed.conn
            .execute(
                "INSERT INTO btq_groups(id, name, level, teacher_id) VALUES('g2', 'BTQ 4', 4, 't2')",
                [],
            )
            .unwrap();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-10T08:00:00");
        seed.conn
            .execute(
                "INSERT INTO students(id, nis, name, class_id, group_id)
                 VALUES('s2', 'nis-s2', 'Budi', 'c1', 'g2')",
                [],
            )
            .unwrap();
        seed.conn
            .execute(
                "INSERT INTO progress(id, student_id, jilid, halaman, status, updated_at)
                 VALUES('pr-s2', 's2', 4, 12, 'Diajukan', '2025-08-10T08:00:00')",
                [],
            )
            .unwrap();
        for i in 0..5 {
            add_log(&seed, "s1", "halaman", &format!("2025-08-{:02}T08:00:00", 11 + i));
        }
        add_log(&seed, "s2", "hafalan", "2025-08-12T08:00:00");

        let m = coordinator_metrics(&seed.conn, &DashboardFilters::default(), d("2025-08-18"))
            .unwrap();
        assert_eq!(m.teacher_ranking.len(), 2);
        assert_eq!(m.teacher_ranking[0].teacher_id, "t1");
        assert_eq!(m.teacher_ranking[0].activity_count, 5);
        assert_eq!(m.teacher_ranking[0].active_students, 1);
        // 11..=15 Aug includes Sat 16? no: 11,12,13,14,15 are Mon-Fri.
        assert_eq!(m.teacher_ranking[0].active_days, 5);

        assert_eq!(m.totals.students, 2);
        assert_eq!(m.totals.teachers_with_group, 2);
        assert_eq!(m.totals.groups, 2);
        assert_eq!(m.totals.classes, 1);
        assert_eq!(m.totals.pending_promotions, 1);

        assert_eq!(m.hafalan_stats.total, 1);
        assert_eq!(m.hafalan_stats.students_with_hafalan, 1);
        assert!((m.hafalan_stats.average_per_student - 0.5).abs() < 1e-9);

        assert_eq!(m.jilid_by_class_level.len(), 2);
        assert_eq!(m.jilid_by_class_level[0].class_level, 7);
    }

    #[test]
    fn monthly_promotions_come_from_approved_reviews() {
        let seed = seed_base();
        add_student(&seed, "s1", "Aisyah", "Proses", "2025-08-10T08:00:00");
        for (id, decision, at) in [
            ("rv1", "Diterima", "2025-06-10T09:00:00"),
            ("rv2", "Diterima", "2025-06-20T09:00:00"),
            ("rv3", "Ditolak", "2025-06-25T09:00:00"),
            ("rv4", "Diterima", "2025-08-01T09:00:00"),
        ] {
            seed.conn
                .execute(
                    "INSERT INTO promotion_reviews(id, progress_id, decision, note, reviewer, reviewed_at)
                     VALUES(?, 'pr-s1', ?, NULL, 'koord', ?)",
                    (id, decision, at),
                )
                .unwrap();
        }

        let m = coordinator_metrics(&seed.conn, &DashboardFilters::default(), d("2025-08-18"))
            .unwrap();
        assert_eq!(
            m.monthly_promotions,
            vec![
                MonthlyPromotionBucket {
                    year: 2025,
                    month: 6,
                    count: 2
                },
                MonthlyPromotionBucket {
                    year: 2025,
                    month: 8,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn filters_parse_defaults_and_reject_malformed_dates() {
        let parsed = parse_dashboard_filters(None).unwrap();
        assert!(parsed.date_from.is_none());

        let raw = serde_json::json!({
            "dateFrom": "2025-08-01",
            "dateTo": null,
            "classLevel": 7,
            "groupId": "g1"
        });
        let parsed = parse_dashboard_filters(Some(&raw)).unwrap();
        assert_eq!(parsed.date_from, Some(d("2025-08-01")));
        assert_eq!(parsed.date_to, None);
        assert_eq!(parsed.class_level, Some(7));
        assert_eq!(parsed.group_id.as_deref(), Some("g1"));

        let bad = serde_json::json!({ "dateFrom": "01/08/2025" });
        let e = parse_dashboard_filters(Some(&bad)).unwrap_err();
        assert_eq!(e.code, "bad_filters");
    }

    #[test]
    fn status_parsing_accepts_legacy_lulus() {
        assert_eq!(ProgressStatus::parse("Lulus"), Some(ProgressStatus::Diterima));
        assert_eq!(ProgressStatus::parse("Proses"), Some(ProgressStatus::Proses));
        assert_eq!(ProgressStatus::parse("lulus"), None);
    }

    #[test]
    fn jilid_ceilings_match_the_curriculum() {
        assert_eq!(jilid_page_ceiling(1), Some(32));
        assert_eq!(jilid_page_ceiling(6), Some(40));
        assert_eq!(jilid_page_ceiling(8), Some(44));
        assert_eq!(jilid_page_ceiling(0), None);
        assert_eq!(jilid_page_ceiling(9), None);
    }
}
