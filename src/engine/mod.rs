/// Launch, readiness polling, crash detection and shutdown of the engine child.
pub mod supervisor;
