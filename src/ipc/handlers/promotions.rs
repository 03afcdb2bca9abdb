use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{jilid_page_ceiling, ProgressStatus, JILID_MAX};
use serde_json::json;
use uuid::Uuid;

use super::progress::{load_progress, now_stamp};

fn handle_propose(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let p = match load_progress(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if p.status != ProgressStatus::Proses {
        return err(
            &req.id,
            "invalid_status",
            format!("cannot propose from status {}", p.status.as_str()),
            None,
        );
    }
    if p.jilid >= JILID_MAX {
        return err(
            &req.id,
            "jilid_max",
            "student is already in the final jilid",
            None,
        );
    }
    let ceiling = match jilid_page_ceiling(p.jilid) {
        Some(c) => c,
        None => {
            return err(
                &req.id,
                "invalid_jilid",
                format!("jilid {} out of range", p.jilid),
                None,
            )
        }
    };
    if p.halaman < ceiling {
        return err(
            &req.id,
            "not_at_ceiling",
            "student has not finished the jilid",
            Some(json!({ "halaman": p.halaman, "ceiling": ceiling })),
        );
    }

    if let Err(e) = conn.execute(
        "UPDATE progress SET status = ?, updated_at = ? WHERE id = ?",
        (ProgressStatus::Diajukan.as_str(), now_stamp(), &p.id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    state.cache.forget("dashboard:*");
    ok(
        &req.id,
        json!({ "studentId": student_id, "status": ProgressStatus::Diajukan.as_str() }),
    )
}

fn handle_review(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let approve = match req.params.get("decision").and_then(|v| v.as_str()) {
        Some("approve") => true,
        Some("reject") => false,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "decision must be one of: approve, reject",
                None,
            )
        }
    };
    let reviewer = match req.params.get("reviewer").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing reviewer", None),
    };
    let note = req
        .params
        .get("note")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let p = match load_progress(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if p.status != ProgressStatus::Diajukan {
        return err(
            &req.id,
            "invalid_status",
            format!("no pending proposal (status {})", p.status.as_str()),
            None,
        );
    }

    let decision = if approve {
        ProgressStatus::Diterima
    } else {
        ProgressStatus::Ditolak
    };
    let (next_jilid, next_halaman) = if approve {
        ((p.jilid + 1).min(JILID_MAX), 1)
    } else {
        (p.jilid, p.halaman)
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "UPDATE progress SET status = ?, jilid = ?, halaman = ?, updated_at = ? WHERE id = ?",
        (decision.as_str(), next_jilid, next_halaman, now_stamp(), &p.id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute(
        "INSERT INTO promotion_reviews(id, progress_id, decision, note, reviewer, reviewed_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &p.id,
            decision.as_str(),
            &note,
            &reviewer,
            now_stamp(),
        ),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    state.cache.forget("dashboard:*");
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "decision": decision.as_str(),
            "jilid": next_jilid,
            "halaman": next_halaman
        }),
    )
}

fn handle_review_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT pr.id, pr.decision, pr.note, pr.reviewer, pr.reviewed_at
         FROM promotion_reviews pr
         JOIN progress p ON p.id = pr.progress_id
         WHERE p.student_id = ?
         ORDER BY pr.reviewed_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |row| {
            let id: String = row.get(0)?;
            let decision: String = row.get(1)?;
            let note: Option<String> = row.get(2)?;
            let reviewer: String = row.get(3)?;
            let reviewed_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "decision": decision,
                "note": note,
                "reviewer": reviewer,
                "reviewedAt": reviewed_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(reviews) => ok(&req.id, json!({ "reviews": reviews })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "promotions.propose" => Some(handle_propose(state, req)),
        "promotions.review" => Some(handle_review(state, req)),
        "promotions.reviewLog" => Some(handle_review_log(state, req)),
        _ => None,
    }
}
