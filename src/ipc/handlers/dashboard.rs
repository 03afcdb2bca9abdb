use crate::cache;
use crate::calendar;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{self, DashboardFilters, MetricsError, TeacherDashboard};
use chrono::NaiveDate;
use serde_json::json;

fn parse_filters(req: &Request) -> Result<DashboardFilters, MetricsError> {
    metrics::parse_dashboard_filters(req.params.get("filters"))
}

fn metrics_err(id: &str, e: MetricsError) -> serde_json::Value {
    err(id, &e.code, e.message, e.details)
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn handle_dashboard_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return metrics_err(&req.id, e),
    };

    let key = cache::dashboard_key("teacher", Some(&teacher_id), &filters.cache_pairs());
    if let Some(hit) = state.cache.get(&key) {
        return ok(&req.id, hit);
    }

    let payload = match metrics::teacher_metrics(conn, &teacher_id, &filters, today()) {
        Ok(TeacherDashboard::NoGroup) => json!({ "status": "no_group" }),
        Ok(TeacherDashboard::NoStudents { group }) => {
            match serde_json::to_value(&group) {
                Ok(g) => json!({ "status": "no_students", "group": g }),
                Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
            }
        }
        Ok(TeacherDashboard::Ready(m)) => match serde_json::to_value(&m) {
            Ok(serde_json::Value::Object(mut obj)) => {
                obj.insert("status".to_string(), json!("ok"));
                serde_json::Value::Object(obj)
            }
            Ok(other) => other,
            Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => return metrics_err(&req.id, e),
    };

    state.cache.put(&key, payload.clone(), state.cache_ttl);
    ok(&req.id, payload)
}

fn handle_dashboard_coordinator(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return metrics_err(&req.id, e),
    };

    let key = cache::dashboard_key("coordinator", None, &filters.cache_pairs());
    if let Some(hit) = state.cache.get(&key) {
        return ok(&req.id, hit);
    }

    let payload = match metrics::coordinator_metrics(conn, &filters, today()) {
        Ok(m) => match serde_json::to_value(&m) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => return metrics_err(&req.id, e),
    };

    state.cache.put(&key, payload.clone(), state.cache_ttl);
    ok(&req.id, payload)
}

fn handle_clear_cache(state: &mut AppState, req: &Request) -> serde_json::Value {
    match req.params.get("pattern").and_then(|v| v.as_str()) {
        Some(pattern) => {
            let cleared = state.cache.forget(pattern);
            ok(&req.id, json!({ "cleared": cleared }))
        }
        None => {
            state.cache.flush();
            ok(&req.id, json!({ "flushed": true }))
        }
    }
}

fn handle_is_business_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None),
        },
        None => today(),
    };
    let holidays = match calendar::load_holidays(conn) {
        Ok(h) => h,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "isBusinessDay": calendar::is_business_day(date, &holidays)
        }),
    )
}

fn handle_active_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let parse = |key: &str| -> Result<Option<NaiveDate>, ()> {
        match req.params.get(key).and_then(|v| v.as_str()) {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| ()),
            None => Ok(None),
        }
    };
    let (from, to) = match (parse("dateFrom"), parse("dateTo")) {
        (Ok(Some(f)), Ok(Some(t))) => (f, t),
        (Ok(None), Ok(None)) => {
            let days = req
                .params
                .get("days")
                .and_then(|v| v.as_i64())
                .unwrap_or(metrics::ACTIVITY_WINDOW_DAYS);
            if !(1..=366).contains(&days) {
                return err(&req.id, "bad_params", "days must be in range 1..=366", None);
            }
            calendar::trailing_window(today(), days)
        }
        (Err(_), _) | (_, Err(_)) => {
            return err(&req.id, "bad_params", "dates must be YYYY-MM-DD", None)
        }
        _ => {
            return err(
                &req.id,
                "bad_params",
                "provide both dateFrom and dateTo, or days",
                None,
            )
        }
    };

    let holidays = match calendar::load_holidays(conn) {
        Ok(h) => h,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let breakdown = calendar::period_breakdown(from, to, &holidays);
    match serde_json::to_value(&breakdown) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.teacher" => Some(handle_dashboard_teacher(state, req)),
        "dashboard.coordinator" => Some(handle_dashboard_coordinator(state, req)),
        "dashboard.clearCache" => Some(handle_clear_cache(state, req)),
        "calendar.isBusinessDay" => Some(handle_is_business_day(state, req)),
        "calendar.activePeriod" => Some(handle_active_period(state, req)),
        _ => None,
    }
}
