use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let class_id = req.params.get("classId").and_then(|v| v.as_str());
    let group_id = req.params.get("groupId").and_then(|v| v.as_str());

    let mut sql = String::from(
        "SELECT s.id, s.nis, s.name, s.class_id, c.name, s.group_id,
                p.jilid, p.halaman, p.status
         FROM students s
         JOIN classes c ON c.id = s.class_id
         LEFT JOIN progress p ON p.student_id = s.id
         WHERE 1 = 1",
    );
    let mut params: Vec<String> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" AND s.class_id = ?");
        params.push(cid.to_string());
    }
    if let Some(gid) = group_id {
        sql.push_str(" AND s.group_id = ?");
        params.push(gid.to_string());
    }
    sql.push_str(" ORDER BY s.name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            let nis: String = row.get(1)?;
            let name: String = row.get(2)?;
            let class_id: String = row.get(3)?;
            let class_name: String = row.get(4)?;
            let group_id: Option<String> = row.get(5)?;
            let jilid: Option<i64> = row.get(6)?;
            let halaman: Option<i64> = row.get(7)?;
            let status: Option<String> = row.get(8)?;
            Ok(json!({
                "id": id,
                "nis": nis,
                "name": name,
                "classId": class_id,
                "className": class_name,
                "groupId": group_id,
                "jilid": jilid,
                "halaman": halaman,
                "status": status
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let nis = match req.params.get("nis").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing nis", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let group_id = req
        .params
        .get("groupId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let taken: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE nis = ?", [&nis], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken.is_some() {
        return err(
            &req.id,
            "duplicate_nis",
            format!("a student with nis {nis} already exists"),
            None,
        );
    }
    let class_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }
    if let Some(gid) = &group_id {
        let group_exists: Option<i64> = match conn
            .query_row("SELECT 1 FROM btq_groups WHERE id = ?", [gid], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if group_exists.is_none() {
            return err(&req.id, "not_found", "group not found", None);
        }
    }

    let student_id = Uuid::new_v4().to_string();
    let progress_id = Uuid::new_v4().to_string();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO students(id, nis, name, class_id, group_id) VALUES(?, ?, ?, ?, ?)",
        (&student_id, &nis, &name, &class_id, &group_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    // Every student starts at jilid 1, page 1.
    if let Err(e) = tx.execute(
        "INSERT INTO progress(id, student_id, jilid, halaman, status, updated_at)
         VALUES(?, ?, 1, 1, 'Proses', ?)",
        (&progress_id, &student_id, super::progress::now_stamp()),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "progressId": progress_id }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let class_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    match conn.execute(
        "UPDATE students SET name = ?, class_id = ? WHERE id = ?",
        (&name, &class_id, &student_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_assign_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let group_id = match req.params.get("groupId") {
        None => return err(&req.id, "bad_params", "missing groupId (string or null)", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => return err(&req.id, "bad_params", "groupId must be string or null", None),
        },
    };

    if let Some(gid) = &group_id {
        let group_exists: Option<i64> = match conn
            .query_row("SELECT 1 FROM btq_groups WHERE id = ?", [gid], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if group_exists.is_none() {
            return err(&req.id, "not_found", "group not found", None);
        }
    }

    match conn.execute(
        "UPDATE students SET group_id = ? WHERE id = ?",
        (&group_id, &student_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "studentId": student_id, "groupId": group_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for sql in [
        "DELETE FROM activity_logs
         WHERE progress_id IN (SELECT id FROM progress WHERE student_id = ?)",
        "DELETE FROM promotion_reviews
         WHERE progress_id IN (SELECT id FROM progress WHERE student_id = ?)",
        "DELETE FROM progress WHERE student_id = ?",
        "DELETE FROM students WHERE id = ?",
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.assignGroup" => Some(handle_students_assign_group(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
