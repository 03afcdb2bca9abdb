mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn deleting_a_teacher_detaches_the_group_atomically() {
    let workspace = temp_dir("btq-teachers");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Ust. Hasan", "nip": "NIP-050" }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();
    let group = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "groups.create",
        json!({ "name": "BTQ 4", "level": 4, "teacherId": teacher_id }),
    );
    let group_id = group["groupId"].as_str().expect("groupId").to_string();

    // Deleting an unknown teacher must leave the assignment untouched.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.delete",
        json!({ "teacherId": "no-such-teacher" }),
    );
    assert_eq!(code, "not_found");
    let listed = request_ok(&mut stdin, &mut reader, "5", "groups.list", json!({}));
    let groups = listed["groups"].as_array().expect("groups");
    assert_eq!(groups[0]["teacherId"], teacher_id.as_str());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "7", "groups.list", json!({}));
    let groups = listed["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 1, "the group outlives its teacher");
    assert_eq!(groups[0]["id"], group_id.as_str());
    assert!(groups[0]["teacherId"].is_null());
    assert!(groups[0]["teacherName"].is_null());
}

#[test]
fn unknown_teacher_dashboard_is_not_found() {
    let workspace = temp_dir("btq-teachers-dash");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "dashboard.teacher",
        json!({ "teacherId": "no-such-teacher" }),
    );
    assert_eq!(code, "not_found");
}
