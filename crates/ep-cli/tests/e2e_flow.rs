//! End-to-end tests driving the `ep` binary.
//!
//! Tests the full pipeline: init → import → plan → save → show

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn ep_binary() -> String {
    env!("CARGO_BIN_EXE_ep").to_string()
}

/// Isolated environment: temp HOME and a config file pointing at a temp
/// database.
struct Env {
    temp: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("data").join("ep.db");
        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            format!("database_path = {:?}\n", db_path.to_string_lossy()),
        )
        .unwrap();
        Self { temp, config }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(ep_binary())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .expect("failed to run ep")
    }

    /// Runs and asserts success, returning stdout.
    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "ep {} should succeed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

const CATALOG: &str = r#"{
  "departments": [{ "id": "CSE", "name": "Computer Science and Engineering" }],
  "programs": [{ "code": "BTECH", "name": "Bachelor of Technology" }],
  "courses": [
    { "code": "CS101", "name": "Programming", "department_id": "CSE", "program_code": "BTECH" },
    { "code": "CS102", "name": "Data Structures", "department_id": "CSE", "program_code": "BTECH" },
    { "code": "CS103", "name": "Discrete Maths", "department_id": "CSE", "program_code": "BTECH" }
  ],
  "exams": [
    { "course_code": "CS101", "course_name": "Programming", "duration_minutes": 180, "program_code": "BTECH" },
    { "course_code": "CS102", "course_name": "Data Structures", "duration_minutes": 120, "program_code": "BTECH" },
    { "course_code": "CS103", "course_name": "Discrete Maths", "duration_minutes": 180, "program_code": "BTECH" }
  ],
  "buildings": [{ "id": "BGB", "name": "Bill Gates Bhavan" }],
  "halls": [
    { "id": "101", "name": "Hall 101", "building_id": "BGB", "rows": 2, "columns": 3, "capacity": 6 },
    { "id": "102", "name": "Hall 102", "building_id": "BGB", "rows": 2, "columns": 2, "capacity": 4 }
  ],
  "students": [
    { "id": "S1", "name": "Asha", "department_id": "CSE", "program": "B.Tech", "enrolled_courses": ["CS101", "CS102"] },
    { "id": "S2", "name": "Ravi", "department_id": "CSE", "program": "B.Tech", "enrolled_courses": ["CS101", "CS102"] },
    { "id": "S3", "name": "Meera", "department_id": "CSE", "program": "B.Tech", "enrolled_courses": ["CS101"] },
    { "id": "S4", "name": "Kiran", "department_id": "CSE", "program": "B.Tech", "enrolled_courses": ["CS102"] }
  ]
}"#;

fn setup_workspace(env: &Env) -> String {
    let workspace = env.ok(&["init", "Autumn Exams"]).trim().to_string();
    assert!(!workspace.is_empty());

    let catalog = env.path().join("catalog.json");
    std::fs::write(&catalog, CATALOG).unwrap();
    let imported = env.ok(&["import", "--workspace", &workspace, catalog.to_str().unwrap()]);
    assert!(imported.contains("Exams:       3"), "{imported}");
    assert!(imported.contains("Students:    4"), "{imported}");

    workspace
}

#[test]
fn test_import_then_plan_is_deterministic() {
    let env = Env::new();
    let workspace = setup_workspace(&env);

    let args = ["plan", "--workspace", &workspace, "--start", "2025-03-03", "--json"];
    let first = env.ok(&args);
    let second = env.ok(&args);
    assert_eq!(first, second, "identical inputs should give identical JSON");

    let plan: serde_json::Value = serde_json::from_str(&first).unwrap();
    // CS103 has no enrolled students.
    assert_eq!(plan["status"], "complete");
    let timetable = plan["timetable"].as_array().unwrap();
    assert_eq!(timetable.len(), 2);
    assert_ne!(
        (&timetable[0]["date"], &timetable[0]["start_time"]),
        (&timetable[1]["date"], &timetable[1]["start_time"]),
        "CS101 and CS102 share students"
    );
    assert_eq!(plan["allocations"].as_array().unwrap().len(), 6);
    let conflicts = plan["conflicts"].as_array().unwrap();
    assert!(
        conflicts
            .iter()
            .any(|c| c.as_str().unwrap().contains("CS103")),
        "{conflicts:?}"
    );
}

#[test]
fn test_saved_plan_can_be_listed_and_shown() {
    let env = Env::new();
    let workspace = setup_workspace(&env);

    let output = env.run(&[
        "plan",
        "--workspace",
        &workspace,
        "--start",
        "2025-03-03",
        "--json",
        "--save",
    ]);
    assert!(output.status.success());
    let planned = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Saved plan "), "{stderr}");

    let listed = env.ok(&["plans", "--workspace", &workspace]);
    assert_eq!(listed.lines().count(), 1);
    let id = listed.split_whitespace().next().unwrap();
    assert!(stderr.contains(id));

    let shown = env.ok(&["show", id, "--json"]);
    assert_eq!(shown, planned);

    let text = env.ok(&["show", id]);
    assert!(text.starts_with(&format!("Plan {id}\n")));
    assert!(text.contains("TIMETABLE"));
}

#[test]
fn test_unknown_exam_fails() {
    let env = Env::new();
    let workspace = setup_workspace(&env);

    let output = env.run(&["plan", "--workspace", &workspace, "--exam", "XX999"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("XX999"), "{stderr}");
}

#[test]
fn test_seed_then_plan() {
    let env = Env::new();
    let seeded = env.ok(&["seed"]);
    assert!(seeded.contains("Students:    50"), "{seeded}");

    let listed = env.ok(&["workspaces", "--json"]);
    let workspaces: serde_json::Value = serde_json::from_str(&listed).unwrap();
    let workspace = workspaces[0]["id"].as_str().unwrap().to_string();

    let report = env.ok(&["plan", "--workspace", &workspace, "--start", "2025-03-03"]);
    assert!(report.starts_with("Status: complete\n"), "{report}");
    assert!(report.contains("Scheduled exams: 7"), "{report}");

    let status = env.ok(&["status"]);
    assert!(status.contains("- Demo Workspace ("), "{status}");
    assert!(status.contains("7 courses, 7 exams, 5 halls, 50 students"), "{status}");
}
