use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_holidays_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "holidays": [] }));
    };

    let mut stmt = match conn.prepare("SELECT id, date, label FROM holidays ORDER BY date") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let date: String = row.get(1)?;
            let label: String = row.get(2)?;
            Ok(json!({ "id": id, "date": date, "label": label }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(holidays) => ok(&req.id, json!({ "holidays": holidays })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_holidays_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing date", None),
    };
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None);
    }
    let label = match req.params.get("label").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing label", None),
    };

    let dup: Option<i64> = match conn
        .query_row("SELECT 1 FROM holidays WHERE date = ?", [&date], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if dup.is_some() {
        return err(
            &req.id,
            "duplicate_date",
            "a holiday already exists on this date",
            Some(json!({ "date": date })),
        );
    }

    let holiday_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO holidays(id, date, label) VALUES(?, ?, ?)",
        (&holiday_id, &date, &label),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    // Active-day denominators shift when the calendar changes.
    state.cache.forget("dashboard:*");
    ok(&req.id, json!({ "holidayId": holiday_id, "date": date }))
}

fn handle_holidays_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing date", None),
    };

    match conn.execute("DELETE FROM holidays WHERE date = ?", [&date]) {
        Ok(0) => err(&req.id, "not_found", "holiday not found", None),
        Ok(_) => {
            state.cache.forget("dashboard:*");
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "holidays.list" => Some(handle_holidays_list(state, req)),
        "holidays.create" => Some(handle_holidays_create(state, req)),
        "holidays.delete" => Some(handle_holidays_delete(state, req)),
        _ => None,
    }
}
