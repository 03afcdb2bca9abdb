use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{jilid_page_ceiling, ProgressStatus};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(crate) fn now_stamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

pub(crate) struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

pub(crate) struct ProgressRow {
    pub id: String,
    pub jilid: i64,
    pub halaman: i64,
    pub status: ProgressStatus,
    pub target_surah: Option<String>,
    pub target_verse: Option<String>,
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub(crate) fn load_progress(conn: &Connection, student_id: &str) -> Result<ProgressRow, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, jilid, halaman, status, target_surah, target_verse
             FROM progress WHERE student_id = ?",
            [student_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((id, jilid, halaman, raw_status, target_surah, target_verse)) = row else {
        return Err(HandlerErr::new("not_found", "progress not found for student"));
    };
    let status = ProgressStatus::parse(&raw_status)
        .ok_or_else(|| HandlerErr::new("invalid_status", format!("unknown status: {raw_status}")))?;
    Ok(ProgressRow {
        id,
        jilid,
        halaman,
        status,
        target_surah,
        target_verse,
    })
}

/// Optional `recordedAt` for backfilling; accepts a full timestamp or a
/// bare date.
fn parse_recorded_at(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let Some(v) = params.get("recordedAt") else {
        return Ok(now_stamp());
    };
    if v.is_null() {
        return Ok(now_stamp());
    }
    let Some(raw) = v.as_str() else {
        return Err(HandlerErr::new("bad_params", "recordedAt must be a string"));
    };
    let t = raw.trim();
    if NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S").is_ok() {
        return Ok(t.to_string());
    }
    if chrono::NaiveDate::parse_from_str(t, "%Y-%m-%d").is_ok() {
        return Ok(format!("{}T00:00:00", t));
    }
    Err(HandlerErr::new(
        "bad_params",
        "recordedAt must be YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
    ))
}

fn handle_progress_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let p = match load_progress(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "progressId": p.id,
            "studentId": student_id,
            "jilid": p.jilid,
            "halaman": p.halaman,
            "halamanCeiling": jilid_page_ceiling(p.jilid),
            "status": p.status.as_str(),
            "targetSurah": p.target_surah,
            "targetVerse": p.target_verse
        }),
    )
}

fn record_pages(
    conn: &Connection,
    student_id: &str,
    pages: i64,
    recorded_at: &str,
) -> Result<(i64, i64), HandlerErr> {
    let p = load_progress(conn, student_id)?;

    // The status gate comes first: a student at the ceiling with a pending
    // proposal is blocked on the review, not on the page count.
    // A rejected or freshly approved promotion returns to `Proses` as
    // soon as the student reads again.
    let next_status = match p.status {
        ProgressStatus::Diajukan => {
            return Err(HandlerErr::new(
                "invalid_status",
                "progress is awaiting promotion review",
            ))
        }
        _ => ProgressStatus::Proses,
    };

    let ceiling = jilid_page_ceiling(p.jilid)
        .ok_or_else(|| HandlerErr::new("invalid_jilid", format!("jilid {} out of range", p.jilid)))?;
    if p.halaman + pages > ceiling {
        return Err(HandlerErr {
            code: "halaman_ceiling",
            message: "cannot advance past the jilid page ceiling; propose a promotion".into(),
            details: Some(json!({
                "jilid": p.jilid,
                "halaman": p.halaman,
                "ceiling": ceiling
            })),
        });
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut halaman = p.halaman;
    for _ in 0..pages {
        halaman += 1;
        tx.execute(
            "INSERT INTO activity_logs(id, progress_id, type, jilid, halaman, recorded_at)
             VALUES(?, ?, 'halaman', ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &p.id,
                p.jilid,
                halaman,
                recorded_at,
            ),
        )
        .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    }
    tx.execute(
        "UPDATE progress SET halaman = ?, status = ?, updated_at = ? WHERE id = ?",
        (halaman, next_status.as_str(), now_stamp(), &p.id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok((p.jilid, halaman))
}

fn handle_record_page(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let pages = req.params.get("pages").and_then(|v| v.as_i64()).unwrap_or(1);
    if !(1..=10).contains(&pages) {
        return err(&req.id, "bad_params", "pages must be in range 1..=10", None);
    }
    let recorded_at = match parse_recorded_at(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match record_pages(conn, &student_id, pages, &recorded_at) {
        Ok((jilid, halaman)) => {
            // Dashboards aggregate activity logs; drop them all.
            state.cache.forget("dashboard:*");
            ok(
                &req.id,
                json!({
                    "studentId": student_id,
                    "jilid": jilid,
                    "halaman": halaman,
                    "pagesRecorded": pages
                }),
            )
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_record_hafalan(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let surah = match get_required_str(&req.params, "surah") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing surah", None),
    };
    let verse = match get_required_str(&req.params, "verse") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing verse", None),
    };
    let recorded_at = match parse_recorded_at(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let p = match load_progress(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let next_status = match p.status {
        ProgressStatus::Diajukan => ProgressStatus::Diajukan,
        _ => ProgressStatus::Proses,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO activity_logs(id, progress_id, type, jilid, halaman, surah, verse, recorded_at)
         VALUES(?, ?, 'hafalan', ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &p.id,
            p.jilid,
            p.halaman,
            &surah,
            &verse,
            &recorded_at,
        ),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute(
        "UPDATE progress SET target_surah = ?, target_verse = ?, status = ?, updated_at = ?
         WHERE id = ?",
        (&surah, &verse, next_status.as_str(), now_stamp(), &p.id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    state.cache.forget("dashboard:*");
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "surah": surah,
            "verse": verse
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.get" => Some(handle_progress_get(state, req)),
        "progress.recordPage" => Some(handle_record_page(state, req)),
        "progress.recordHafalan" => Some(handle_record_hafalan(state, req)),
        _ => None,
    }
}
