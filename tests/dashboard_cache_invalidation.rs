mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn coordinator_dashboard_is_cached_until_activity_writes() {
    let workspace = temp_dir("btq-dashboard-cache");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "7C", "level": 7 }),
    );
    let class_id = class["classId"].as_str().expect("classId").to_string();
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "name": "Ust. Salma", "nip": "NIP-030" }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();
    let group = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "groups.create",
        json!({ "name": "BTQ 7", "level": 7, "teacherId": teacher_id }),
    );
    let group_id = group["groupId"].as_str().expect("groupId").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "nis": "2025900", "name": "Zaid", "classId": class_id, "groupId": group_id }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "progress.recordPage",
        json!({ "studentId": student_id }),
    );

    let first = request_ok(&mut stdin, &mut reader, "7", "dashboard.coordinator", json!({}));
    let second = request_ok(&mut stdin, &mut reader, "8", "dashboard.coordinator", json!({}));
    assert_eq!(first, second, "cached hit must replay the stored payload");

    // A page completion invalidates every dashboard entry.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "progress.recordPage",
        json!({ "studentId": student_id }),
    );
    let third = request_ok(&mut stdin, &mut reader, "10", "dashboard.coordinator", json!({}));
    assert_ne!(first, third, "activity writes must recompute the dashboard");

    let ranking = third["teacherRanking"].as_array().expect("ranking");
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0]["teacherName"], "Ust. Salma");
    assert_eq!(ranking[0]["activityCount"], 2);

    // Distinct filters resolve to distinct cache entries.
    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "dashboard.coordinator",
        json!({ "filters": { "classLevel": 8 } }),
    );
    assert_eq!(filtered["totals"]["students"], 0);
    assert_eq!(third["totals"]["students"], 1);

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "dashboard.clearCache",
        json!({ "pattern": "dashboard:teacher:" }),
    );
    assert_eq!(cleared["cleared"], 0);

    let flushed = request_ok(&mut stdin, &mut reader, "13", "dashboard.clearCache", json!({}));
    assert_eq!(flushed["flushed"], true);
}
