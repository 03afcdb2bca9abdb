use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "groups": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           g.id, g.name, g.level, g.teacher_id, e.name,
           g.target_surah, g.target_verse_start, g.target_verse_end,
           (SELECT COUNT(*) FROM students s WHERE s.group_id = g.id) AS student_count
         FROM btq_groups g
         LEFT JOIN employees e ON e.id = g.teacher_id
         ORDER BY g.level, g.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let level: i64 = row.get(2)?;
            let teacher_id: Option<String> = row.get(3)?;
            let teacher_name: Option<String> = row.get(4)?;
            let target_surah: Option<String> = row.get(5)?;
            let verse_start: Option<i64> = row.get(6)?;
            let verse_end: Option<i64> = row.get(7)?;
            let student_count: i64 = row.get(8)?;
            Ok(json!({
                "id": id,
                "name": name,
                "level": level,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "target": target_surah.map(|surah| json!({
                    "surah": surah,
                    "verseStart": verse_start,
                    "verseEnd": verse_end
                })),
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(groups) => ok(&req.id, json!({ "groups": groups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn teacher_available(
    conn: &rusqlite::Connection,
    teacher_id: &str,
    except_group: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM employees WHERE id = ?", [teacher_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Ok(false);
    }
    // One group per teacher.
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM btq_groups WHERE teacher_id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match taken {
        None => true,
        Some(gid) => except_group == Some(gid.as_str()),
    })
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let Some(level) = req.params.get("level").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing level", None);
    };
    let teacher_id = req
        .params
        .get("teacherId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if let Some(tid) = &teacher_id {
        match teacher_available(conn, tid, None) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "teacher_unavailable",
                    "teacher missing or already assigned to a group",
                    Some(json!({ "teacherId": tid })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let group_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO btq_groups(id, name, level, teacher_id) VALUES(?, ?, ?, ?)",
        (&group_id, &name, level, &teacher_id),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "groupId": group_id }))
}

fn handle_groups_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let Some(level) = req.params.get("level").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing level", None);
    };

    match conn.execute(
        "UPDATE btq_groups SET name = ?, level = ? WHERE id = ?",
        (&name, level, &group_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "group not found", None),
        Ok(_) => ok(&req.id, json!({ "groupId": group_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_groups_assign_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };
    let teacher_id = match req.params.get("teacherId") {
        None => return err(&req.id, "bad_params", "missing teacherId (string or null)", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => return err(&req.id, "bad_params", "teacherId must be string or null", None),
        },
    };

    if let Some(tid) = &teacher_id {
        match teacher_available(conn, tid, Some(group_id.as_str())) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "teacher_unavailable",
                    "teacher missing or already assigned to a group",
                    Some(json!({ "teacherId": tid })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    match conn.execute(
        "UPDATE btq_groups SET teacher_id = ? WHERE id = ?",
        (&teacher_id, &group_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "group not found", None),
        Ok(_) => ok(&req.id, json!({ "groupId": group_id, "teacherId": teacher_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_groups_set_target(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };
    let surah = match req.params.get("surah").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing surah", None),
    };
    let verse_start = req.params.get("verseStart").and_then(|v| v.as_i64());
    let verse_end = req.params.get("verseEnd").and_then(|v| v.as_i64());
    if let (Some(a), Some(b)) = (verse_start, verse_end) {
        if a > b {
            return err(&req.id, "bad_params", "verseStart must be <= verseEnd", None);
        }
    }

    match conn.execute(
        "UPDATE btq_groups
         SET target_surah = ?, target_verse_start = ?, target_verse_end = ?
         WHERE id = ?",
        (&surah, verse_start, verse_end, &group_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "group not found", None),
        Ok(_) => ok(&req.id, json!({ "groupId": group_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // Members stay enrolled in school, just without a cohort.
    if let Err(e) = tx.execute(
        "UPDATE students SET group_id = NULL WHERE group_id = ?",
        [&group_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    match tx.execute("DELETE FROM btq_groups WHERE id = ?", [&group_id]) {
        Ok(0) => {
            let _ = tx.rollback();
            err(&req.id, "not_found", "group not found", None)
        }
        Ok(_) => match tx.commit() {
            Ok(()) => ok(&req.id, json!({ "deleted": true })),
            Err(e) => err(&req.id, "db_tx_failed", e.to_string(), None),
        },
        Err(e) => {
            let _ = tx.rollback();
            err(&req.id, "db_delete_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.list" => Some(handle_groups_list(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.update" => Some(handle_groups_update(state, req)),
        "groups.assignTeacher" => Some(handle_groups_assign_teacher(state, req)),
        "groups.setTarget" => Some(handle_groups_set_target(state, req)),
        "groups.delete" => Some(handle_groups_delete(state, req)),
        _ => None,
    }
}
