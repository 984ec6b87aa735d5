use super::*;

#[test]
fn accepts_typical_session_ids() {
    assert!(validate_session_id("s1").is_ok());
    assert!(validate_session_id("session:1_abc-2.3").is_ok());
}

#[test]
fn rejects_empty_and_illegal_session_ids() {
    assert!(validate_session_id("").is_err());
    assert!(validate_session_id("has space").is_err());
    assert!(validate_session_id("slash/is/bad").is_err());
    assert!(validate_session_id(&"x".repeat(129)).is_err());
}

#[test]
fn owns_socket_path_rejects_paths_outside_sockets_dir() {
    let sockets_dir = Path::new("/data/attn/sockets");
    assert!(owns_socket_path(sockets_dir, "/data/attn/sockets/s1.sock"));
    assert!(!owns_socket_path(sockets_dir, "/tmp/other/s1.sock"));
}

#[tokio::test]
async fn quarantine_file_moves_and_suffixes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let quarantine_dir = dir.path().join("quarantine");
    std::fs::create_dir_all(&quarantine_dir).expect("mkdir");
    let src = dir.path().join("s1.json");
    std::fs::write(&src, b"{}").expect("write");

    quarantine_file(&quarantine_dir, &src, "malformed");

    assert!(!src.exists());
    let moved: Vec<_> = std::fs::read_dir(&quarantine_dir)
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(moved.len(), 1);
    let name = moved[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("s1.json.malformed."), "unexpected name: {name}");
}
