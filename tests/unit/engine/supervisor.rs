use std::net::TcpListener;

use super::*;

fn launch() -> EngineLaunch {
    EngineLaunch::new("Cargo.toml", ".").unwrap()
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn launch_requires_existing_paths() {
    assert!(matches!(
        EngineLaunch::new("does/not/exist", "."),
        Err(MiiError::Validation(_))
    ));
    assert!(matches!(
        EngineLaunch::new("Cargo.toml", "does/not/exist"),
        Err(MiiError::Validation(_))
    ));
    assert!(matches!(
        EngineLaunch::new(".", "."),
        Err(MiiError::Validation(_))
    ));

    let l = launch().with_args(["--verbose"]);
    assert_eq!(l.executable(), Path::new("Cargo.toml"));
    assert_eq!(l.working_dir(), Path::new("."));
    assert_eq!(l.extra_args, vec!["--verbose".to_string()]);
}

#[test]
fn start_attaches_to_an_engine_owned_elsewhere() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut sup = EngineSupervisor::new(launch(), SupervisorOpts::new(port), tracing::Span::none());
    assert_eq!(sup.state(), EngineState::NotStarted);
    assert!(sup.is_running());

    sup.start().unwrap();
    assert_eq!(sup.state(), EngineState::Running);
    assert_eq!(sup.pid(), None);

    sup.start().unwrap();
    assert_eq!(sup.pid(), None);

    sup.stop().unwrap();
    assert_eq!(sup.state(), EngineState::Stopped);
    assert!(sup.is_running(), "foreign engine must be left alone");
    drop(listener);
}

#[test]
fn stop_without_start_is_a_no_op() {
    let mut sup = EngineSupervisor::new(
        launch(),
        SupervisorOpts::new(free_port()),
        tracing::Span::none(),
    );
    sup.stop().unwrap();
    sup.stop().unwrap();
    assert_eq!(sup.state(), EngineState::NotStarted);
    assert!(!sup.is_running());

    sup.observe_refused();
    assert_eq!(sup.poll(), EngineState::NotStarted);
}

#[cfg(unix)]
#[test]
fn unlaunchable_executable_is_a_backend_error() {
    // A plain file without the executable bit.
    let mut sup = EngineSupervisor::new(
        launch(),
        SupervisorOpts::new(free_port()),
        tracing::Span::none(),
    );
    let err = sup.start().unwrap_err();
    assert!(matches!(err, MiiError::Backend { .. }), "{err}");
    assert_eq!(sup.pid(), None);
}

#[test]
fn refusal_after_running_marks_crash() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut sup = EngineSupervisor::new(launch(), SupervisorOpts::new(port), tracing::Span::none());
    sup.start().unwrap();
    drop(listener);

    sup.observe_refused();
    assert_eq!(sup.state(), EngineState::Crashed { exit_code: None });
    assert!(!sup.is_running());
}
