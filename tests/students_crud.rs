mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn student_lifecycle_and_roster_filters() {
    let workspace = temp_dir("btq-students");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_a = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "7A", "level": 7 }),
    );
    let class_a_id = class_a["classId"].as_str().expect("classId").to_string();
    let class_b = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "8A", "level": 8 }),
    );
    let class_b_id = class_b["classId"].as_str().expect("classId").to_string();
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "name": "Ust. Rahma", "nip": "NIP-040" }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();
    let group = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "groups.create",
        json!({ "name": "BTQ 1", "level": 7, "teacherId": teacher_id }),
    );
    let group_id = group["groupId"].as_str().expect("groupId").to_string();

    let fatimah = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "nis": "2025001", "name": "Fatimah", "classId": class_a_id, "groupId": group_id }),
    );
    let fatimah_id = fatimah["studentId"].as_str().expect("studentId").to_string();
    let umar = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "nis": "2025002", "name": "Umar", "classId": class_b_id }),
    );
    let umar_id = umar["studentId"].as_str().expect("studentId").to_string();

    // A fresh student starts at jilid 1, halaman 1.
    let progress = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "progress.get",
        json!({ "studentId": fatimah_id }),
    );
    assert_eq!(progress["jilid"], 1);
    assert_eq!(progress["halaman"], 1);
    assert_eq!(progress["status"], "Proses");

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.list",
        json!({ "groupId": group_id }),
    );
    let students = roster["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["name"], "Fatimah");

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "classId": class_b_id }),
    );
    assert_eq!(roster["students"].as_array().expect("students").len(), 1);

    // Moving Umar into the group shows up in the filtered roster.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.assignGroup",
        json!({ "studentId": umar_id, "groupId": group_id }),
    );
    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.list",
        json!({ "groupId": group_id }),
    );
    assert_eq!(roster["students"].as_array().expect("students").len(), 2);

    // A populated class refuses deletion until its students move out.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "classes.delete",
        json!({ "classId": class_a_id }),
    );
    assert_eq!(code, "class_not_empty");

    // Deleting the group detaches members instead of deleting them.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "groups.delete",
        json!({ "groupId": group_id }),
    );
    let roster = request_ok(&mut stdin, &mut reader, "15", "students.list", json!({}));
    let students = roster["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert!(students.iter().all(|s| s["groupId"].is_null()));

    // Deleting a student cascades through progress and its logs.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "progress.recordPage",
        json!({ "studentId": fatimah_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "students.delete",
        json!({ "studentId": fatimah_id }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "18",
        "progress.get",
        json!({ "studentId": fatimah_id }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "19",
        "students.create",
        json!({ "nis": "2025002", "name": "Dobel", "classId": class_b_id }),
    );
    assert_eq!(code, "duplicate_nis");
}
