use graft_util::hash::sha256_bytes;

#[test]
fn test_sha256_bytes_empty() {
    let hash = sha256_bytes(b"");
    assert_eq!(
        hash,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_bytes_hello() {
    let hash = sha256_bytes(b"hello");
    assert_eq!(
        hash,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn test_sha256_bytes_deterministic() {
    let a = sha256_bytes(b"graft");
    let b = sha256_bytes(b"graft");
    assert_eq!(a, b);
    assert_ne!(a, sha256_bytes(b"graft "));
}
