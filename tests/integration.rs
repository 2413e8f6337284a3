use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const HOST: &str = "[host]\n\
birth_rate = 1.0\n\
death_rate = 0.2\n\
carrying_capacity = 80.0\n\
contact_rate = 1.0\n\n";

fn setup_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    fs::write(&config_path, config_contents).expect("failed to write config file");

    test_dir
}

fn exec_bin(test_dir: &Path, args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_strainflow"));
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    Command::new(bin)
        .arg("--sim-dir")
        .arg(test_dir_str)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn run_bin(test_dir: &Path, args: &[&str]) {
    let output = exec_bin(test_dir, args);

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

#[test]
fn sampled_workflow() {
    let config_contents = String::new()
        + HOST
        + "[strains]\n"
        + "n_slots = 4\n"
        + "\n"
        + "[strains.sampler]\n"
        + "seed = 12345\n"
        + "vir_min = 0.05\n"
        + "vir_max = 0.5\n"
        + "beta_scale = 0.05\n"
        + "beta_exponent = 0.5\n"
        + "vert_min = 0.2\n"
        + "vert_max = 0.8\n"
        + "\n"
        + "[output]\n"
        + "window_length = 50.0\n";
    let test_dir = setup_dir("sampled_workflow", &config_contents);

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["create"]);

    for run in ["run-0000", "run-0001"] {
        assert!(test_dir.join(run).join("params.msgpack").is_file());
        assert!(test_dir.join(run).join("population.msgpack").is_file());
    }

    // A fixed seed gives identical runs.
    let run_a = fs::read(test_dir.join("run-0000").join("population.msgpack")).unwrap();
    let run_b = fs::read(test_dir.join("run-0001").join("population.msgpack")).unwrap();
    assert_eq!(run_a, run_b);

    run_bin(&test_dir, &["analyze"]);
    assert!(test_dir.join("run-0001").join("results.msgpack").is_file());

    run_bin(&test_dir, &["clean"]);
    assert!(!test_dir.join("run-0001").join("results.msgpack").exists());
    assert!(test_dir.join("run-0001").join("population.msgpack").is_file());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn explicit_traits_workflow() {
    let config_contents = String::new()
        + HOST
        + "[strains]\n"
        + "n_slots = 2\n"
        + "\n"
        + "[strains.traits]\n"
        + "birth = [0.5, 0.5]\n"
        + "death = [0.3, 0.3]\n"
        + "transmission = [0.4, 0.4]\n"
        + "external = [0.2, 0.2]\n"
        + "\n"
        + "[output]\n"
        + "window_length = 10.0\n";
    let test_dir = setup_dir("explicit_traits_workflow", &config_contents);

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["analyze"]);
    assert!(test_dir.join("run-0000").join("results.msgpack").is_file());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn missing_extinction_slot_fails() {
    let config_contents = String::new()
        + HOST
        + "[strains]\n"
        + "n_slots = 1\n"
        + "\n"
        + "[strains.traits]\n"
        + "birth = [0.5]\n"
        + "death = [0.3]\n"
        + "transmission = [0.4]\n"
        + "external = [0.2]\n"
        + "\n"
        + "[output]\n"
        + "n_windows = 2\n"
        + "window_length = 10.0\n";
    let test_dir = setup_dir("missing_extinction_slot_fails", &config_contents);

    let output = exec_bin(&test_dir, &["create"]);
    assert!(!output.status.success());
    let stderr_str = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr_str.contains("NoExtinctionSlot"),
        "unexpected stderr:\n{stderr_str}"
    );
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}
