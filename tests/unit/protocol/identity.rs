use super::*;

#[test]
fn from_slice_rejects_wrong_lengths() {
    for len in [0usize, 95, 97] {
        let err = MiiIdentity::from_slice(&vec![0u8; len]).unwrap_err();
        assert!(matches!(err, MiiError::Validation(_)), "len {len}: {err}");
    }
    assert!(MiiIdentity::from_slice(&[7u8; IDENTITY_LEN]).is_ok());
}

#[test]
fn from_path_reads_leading_bytes_only() {
    let dir = std::path::PathBuf::from("target").join("unit_identity");
    std::fs::create_dir_all(&dir).unwrap();

    let long = dir.join("long.bin");
    let mut bytes: Vec<u8> = (0..IDENTITY_LEN as u8).collect();
    bytes.extend_from_slice(&[0xff; 20]);
    std::fs::write(&long, &bytes).unwrap();
    let id = MiiIdentity::from_path(&long).unwrap();
    assert_eq!(&id.as_bytes()[..], &bytes[..IDENTITY_LEN]);

    let short = dir.join("short.bin");
    std::fs::write(&short, [1u8; 40]).unwrap();
    assert!(matches!(
        MiiIdentity::from_path(&short),
        Err(MiiError::Validation(_))
    ));

    assert!(MiiIdentity::from_path(dir.join("missing.bin")).is_err());
}

#[test]
fn debug_is_abbreviated() {
    let id = MiiIdentity::from([0xabu8; IDENTITY_LEN]);
    assert_eq!(format!("{id:?}"), "MiiIdentity(abababab..)");
}
