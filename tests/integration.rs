use std::path::Path;
use std::process::{Command, Output};

fn doclinks_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_doclinks"));
    cmd.current_dir(dir);
    cmd.env_remove("GITHUB_TOKEN");
    cmd
}

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new("tests/fixtures").join(name)
}

/// Copy a fixture into a fresh temp dir so the run may write to it.
fn scratch_copy(name: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir(fixture(name)).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn clean_tree_passes() {
    let check = doclinks_cmd(&fixture("clean")).arg("check").output().unwrap();
    assert!(check.status.success(), "check failed: {}{}", stdout(&check), String::from_utf8_lossy(&check.stderr));
    assert!(stdout(&check).contains("No issues found."));
}

#[test]
fn broken_tree_fails_with_grouped_report() {
    let check = doclinks_cmd(&fixture("broken")).arg("check").output().unwrap();
    assert_eq!(check.status.code(), Some(1));

    let out = stdout(&check);
    assert!(out.contains("Linked file not found (1)"), "{out}");
    assert!(out.contains("README.md:3:"), "{out}");
    assert!(out.contains("Missing anchor (1)"), "{out}");
    assert!(out.contains("did you mean #installation?"), "{out}");
    assert!(!out.contains("Unknown link format"), "{out}");
}

#[test]
fn root_argument_selects_the_tree() {
    let check = doclinks_cmd(Path::new(".")).args(["check", "tests/fixtures/clean"]).output().unwrap();
    assert!(check.status.success(), "check failed: {}", stdout(&check));
}

#[test]
fn fix_rewrites_misspelled_anchor() {
    let dir = scratch_copy("broken");
    std::fs::write(dir.path().join("missing.md"), "# Now present\n").unwrap();

    let check = doclinks_cmd(dir.path()).args(["check", "--fix"]).output().unwrap();
    assert!(check.status.success(), "fix run failed: {}", stdout(&check));
    assert!(stdout(&check).contains("Applied 1 fixes"));

    let readme = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
    assert!(readme.contains("(./guide.md#installation)"), "{readme}");

    let again = doclinks_cmd(dir.path()).arg("check").output().unwrap();
    assert!(again.status.success());
}

#[test]
fn debug_cache_skips_the_crawl() {
    let dir = scratch_copy("broken");

    let first = doclinks_cmd(dir.path()).args(["check", "--debug"]).output().unwrap();
    assert_eq!(first.status.code(), Some(1));
    assert!(dir.path().join(".doclinks-cache.json").exists());

    // The file now exists, but the cached issues are reported anyway.
    std::fs::write(dir.path().join("missing.md"), "# Now present\n").unwrap();
    let cached = doclinks_cmd(dir.path()).args(["check", "--debug"]).output().unwrap();
    assert_eq!(cached.status.code(), Some(1));
    assert!(stdout(&cached).contains("Linked file not found (1)"));

    let fresh = doclinks_cmd(dir.path()).arg("check").output().unwrap();
    assert!(!stdout(&fresh).contains("Linked file not found"));
}

#[test]
fn module_doc_comment_links_are_checked() {
    let module = doclinks_cmd(&fixture("module")).args(["module", "mod.ts"]).output().unwrap();
    assert_eq!(module.status.code(), Some(1));

    let out = stdout(&module);
    assert!(out.contains("./usage.md#options has no anchor #options"), "{out}");
    assert!(!out.contains("#usage has no anchor"), "{out}");
    assert!(!out.contains("ignored"), "{out}");
}

#[test]
fn invalid_module_entry_is_a_rendered_error() {
    let module = doclinks_cmd(&fixture("module")).args(["module", "nope.ts"]).output().unwrap();
    assert_eq!(module.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&module.stderr);
    assert!(stderr.contains("Error: Invalid Module Entry Point"), "{stderr}");
}
