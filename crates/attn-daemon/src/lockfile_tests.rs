use super::*;

#[test]
fn acquires_and_mints_instance_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lock = DaemonLock::acquire(dir.path()).expect("acquire");
    assert_eq!(lock.daemon_instance_id.len(), 32);
}

#[test]
fn reuses_instance_id_across_acquisitions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id = {
        let lock = DaemonLock::acquire(dir.path()).expect("acquire");
        lock.daemon_instance_id.clone()
    };
    let lock2 = DaemonLock::acquire(dir.path()).expect("second acquire after drop");
    assert_eq!(lock2.daemon_instance_id, id);
}

#[test]
fn second_concurrent_acquisition_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _lock = DaemonLock::acquire(dir.path()).expect("first acquire");
    let result = DaemonLock::acquire(dir.path());
    assert!(result.is_err());
}
