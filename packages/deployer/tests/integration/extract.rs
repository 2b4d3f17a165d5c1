use std::fs;

use deployer::archive::{ExtractError, ExtractLimits, extract};

use crate::common::{file_options, zip_of};

const CRON_PAYLOAD: &[u8] = b"* * * * * root id\n";

mod traversal {
    use super::*;

    #[test]
    fn cron_drop_outside_output_is_rejected() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("applications/ghsa-rce/code");
        let bytes = zip_of(&[
            ("package.json", br#"{"name": "app", "version": "1.0.0"}"#),
            ("index.js", br#"console.log("Application");"#),
            ("../../../../../etc/cron.d/malicious-cron", CRON_PAYLOAD),
        ]);

        let err = extract(&bytes, &output, &ExtractLimits::default()).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ExtractError::PathTraversalDetected { .. }));
        assert!(message.starts_with("Path traversal detected"), "{message}");
        assert!(
            message.contains("resolved path escapes output directory"),
            "{message}"
        );
        assert!(message.contains("../../../../../etc/cron.d/malicious-cron"));

        assert!(!sandbox.path().join("etc").exists());
        assert!(!sandbox.path().join("applications/etc").exists());
        assert!(!output.join("etc").exists());
    }

    #[test]
    fn same_name_under_output_is_allowed() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let bytes = zip_of(&[
            ("etc/cron.d/malicious-cron", CRON_PAYLOAD),
            ("package.json", br#"{"name":"app"}"#),
        ]);

        let summary = extract(&bytes, &output, &ExtractLimits::default()).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(
            fs::read(output.join("etc/cron.d/malicious-cron")).unwrap(),
            CRON_PAYLOAD
        );
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let bytes = zip_of(&[("../code-evil/x.txt", b"x")]);

        let err = extract(&bytes, &output, &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::PathTraversalDetected { .. }));
        assert!(!sandbox.path().join("code-evil").exists());
    }

    #[test]
    fn absolute_entry_names_stay_inside_output() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let bytes = zip_of(&[("/etc/passwd", b"root:x:0:0")]);

        extract(&bytes, &output, &ExtractLimits::default()).unwrap();
        assert_eq!(
            fs::read(output.join("etc/passwd")).unwrap(),
            b"root:x:0:0"
        );
    }

    #[test]
    fn dot_dot_that_stays_inside_is_accepted() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let bytes = zip_of(&[("a/b/../c.txt", b"c")]);

        extract(&bytes, &output, &ExtractLimits::default()).unwrap();
        assert_eq!(fs::read(output.join("a/c.txt")).unwrap(), b"c");
        assert!(output.join("a").is_dir());
    }
}

mod layout {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;

    #[test]
    fn nested_directories_are_created() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.add_directory("assets/", file_options()).unwrap();
        writer
            .start_file("src/deep/nested/mod.rs", file_options())
            .unwrap();
        writer.write_all(b"pub fn f() {}\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let summary = extract(&bytes, &output, &ExtractLimits::default()).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 1);
        assert!(output.join("assets").is_dir());
        assert_eq!(
            fs::read_to_string(output.join("src/deep/nested/mod.rs")).unwrap(),
            "pub fn f() {}\n"
        );
    }

    #[test]
    fn earlier_entries_remain_when_a_later_one_fails() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let bytes = zip_of(&[("ok.txt", b"ok"), ("../escape.txt", b"no")]);

        assert!(extract(&bytes, &output, &ExtractLimits::default()).is_err());
        assert_eq!(fs::read(output.join("ok.txt")).unwrap(), b"ok");
        assert!(!sandbox.path().join("escape.txt").exists());
    }

    #[test]
    fn decompression_bomb_is_cut_off() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");
        let zeros = vec![0u8; 1024 * 1024];
        let bytes = zip_of(&[("bomb.bin", &zeros)]);
        let limits = ExtractLimits {
            max_total_bytes: 64 * 1024,
            max_entry_bytes: 64 * 1024,
            ..ExtractLimits::default()
        };

        let err = extract(&bytes, &output, &limits).unwrap_err();
        assert!(err.is_security_rejection());
        assert!(!output.join("bomb.bin").exists());
    }
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::io::Cursor;
    use std::os::unix::fs::symlink;
    use zip::ZipWriter;

    #[test]
    fn symlink_entries_are_rejected() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_symlink("link", "/etc/passwd", file_options())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract(&bytes, &output, &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::SymlinkEntryRejected { .. }));
        assert_eq!(err.to_string(), "Symlink entries are not allowed: 'link'");
        assert!(fs::symlink_metadata(output.join("link")).is_err());
    }

    #[test]
    fn symlink_after_regular_entries_is_rejected_before_writing() {
        use std::io::Write;

        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("code");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("index.js", file_options()).unwrap();
        writer.write_all(b"console.log(1);").unwrap();
        writer
            .add_symlink("link", "/etc/passwd", file_options())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract(&bytes, &output, &ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::SymlinkEntryRejected { entry } if entry == "link"));
        assert!(!output.join("index.js").exists());
        assert!(fs::symlink_metadata(output.join("link")).is_err());
    }

    #[test]
    fn planted_directory_symlink_is_not_followed_outside() {
        let sandbox = tempfile::tempdir().unwrap();
        let output = sandbox.path().join("applications/symlink-existing/code");
        let outside = sandbox.path().join("outside");
        fs::create_dir_all(&output).unwrap();
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, output.join("logs")).unwrap();

        let bytes = zip_of(&[("logs/pwned.txt", b"owned")]);
        let err = extract(&bytes, &output, &ExtractLimits::default()).unwrap_err();

        assert!(matches!(err, ExtractError::PathTraversalDetected { .. }));
        assert!(!outside.join("pwned.txt").exists());
    }
}
