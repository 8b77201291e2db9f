//! Built-in self-test: a scripted session served through the real framing
//! and dispatch path over in-memory buffers.

use sqinn_core::{Command, DEFAULT_MAX_FRAME_LEN, Reply, Status, Value, read_frame, write_frame};
use sqinn_sqlite::{DriverOptions, Interpreter, MEMORY_PATH, serve};
use tracing::{debug, info};

/// Expected outcome of one scripted command.
enum Expect {
    Reply(Reply),
    Status(Status),
}

struct Step {
    command: Command,
    expect: Expect,
}

fn ok(command: Command, reply: Reply) -> Step {
    Step {
        command,
        expect: Expect::Reply(reply),
    }
}

fn fails(command: Command, status: Status) -> Step {
    Step {
        command,
        expect: Expect::Status(status),
    }
}

fn script() -> Vec<Step> {
    let sql = |s: &str| s.to_string();
    vec![
        fails(Command::Prepare { sql: sql("SELECT 1") }, Status::State),
        ok(
            Command::Open {
                path: MEMORY_PATH.into(),
            },
            Reply::Ack,
        ),
        ok(
            Command::Exec {
                sql: sql("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, weight REAL, avatar BLOB)"),
            },
            Reply::Executed { changes: 0 },
        ),
        ok(
            Command::Prepare {
                sql: sql("INSERT INTO users (id, name, weight, avatar) VALUES (?, ?, ?, ?)"),
            },
            Reply::Prepared {
                handle: 1,
                param_count: 4,
                column_count: 0,
            },
        ),
        ok(bind(1, 0, 1_i64), Reply::Ack),
        ok(bind(1, 1, "Alice"), Reply::Ack),
        ok(bind(1, 2, 57.25), Reply::Ack),
        ok(bind(1, 3, vec![0_u8, 1, 2]), Reply::Ack),
        fails(bind(1, 4, 0_i64), Status::Bind),
        ok(Command::Step { handle: 1 }, Reply::NoRow),
        ok(bind(1, 0, 2_i64), Reply::Ack),
        ok(bind(1, 1, Value::Null), Reply::Ack),
        ok(bind(1, 2, Value::Null), Reply::Ack),
        ok(bind(1, 3, Value::Null), Reply::Ack),
        ok(Command::Step { handle: 1 }, Reply::NoRow),
        // stays done until rebound
        ok(Command::Step { handle: 1 }, Reply::NoRow),
        ok(Command::Finalize { handle: 1 }, Reply::Ack),
        fails(Command::Finalize { handle: 1 }, Status::UnknownHandle),
        ok(
            Command::Prepare {
                sql: sql("SELECT id, name, weight, avatar FROM users ORDER BY id"),
            },
            Reply::Prepared {
                handle: 2,
                param_count: 0,
                column_count: 4,
            },
        ),
        ok(
            Command::Step { handle: 2 },
            Reply::Row(vec![
                Value::Integer(1),
                Value::from("Alice"),
                Value::Real(57.25),
                Value::Blob(vec![0, 1, 2]),
            ]),
        ),
        ok(
            Command::Step { handle: 2 },
            Reply::Row(vec![Value::Integer(2), Value::Null, Value::Null, Value::Null]),
        ),
        ok(Command::Step { handle: 2 }, Reply::NoRow),
        fails(Command::Step { handle: 9999 }, Status::UnknownHandle),
        fails(Command::Exec { sql: sql("SELEC 1") }, Status::Engine),
        ok(
            Command::Exec {
                sql: sql("DELETE FROM users"),
            },
            Reply::Executed { changes: 2 },
        ),
        ok(
            Command::Prepare { sql: sql("SELECT 1") },
            Reply::Prepared {
                handle: 3,
                param_count: 0,
                column_count: 1,
            },
        ),
        ok(Command::Close, Reply::Ack),
        fails(Command::Step { handle: 2 }, Status::UnknownHandle),
        fails(Command::Step { handle: 3 }, Status::UnknownHandle),
        fails(Command::Close, Status::State),
    ]
}

fn bind(handle: u64, index: u32, value: impl Into<Value>) -> Command {
    Command::Bind {
        handle,
        index,
        value: value.into(),
    }
}

/// Outcome of a passing self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestReport {
    pub commands: u64,
    pub errors: u64,
}

/// Runs the scripted session and checks every reply and the handle
/// bookkeeping afterwards.
pub fn run() -> Result<SelfTestReport, String> {
    let steps = script();

    let mut input = Vec::new();
    for step in &steps {
        write_frame(&mut input, &step.command.to_bytes()).map_err(|err| err.to_string())?;
    }

    let mut interp = Interpreter::new();
    let mut output = Vec::new();
    let summary = serve(
        &mut interp,
        &mut input.as_slice(),
        &mut output,
        &DriverOptions::default(),
    )
    .map_err(|err| format!("serving loop failed: {err}"))?;

    let mut reader = output.as_slice();
    for (n, step) in steps.iter().enumerate() {
        let opcode = step.command.opcode();
        let payload = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .map_err(|err| format!("reply {n}: {err}"))?
            .ok_or_else(|| format!("reply {n} ({opcode}) missing"))?;
        let reply =
            Reply::decode(opcode, &payload).map_err(|err| format!("reply {n} ({opcode}): {err}"))?;
        debug!(n, %opcode, status = %reply.status(), "self-test reply");
        check(&step.expect, &reply).map_err(|err| format!("reply {n} ({opcode}): {err}"))?;
    }
    if !reader.is_empty() {
        return Err(format!("{} unexpected trailing reply bytes", reader.len()));
    }

    let stats = interp
        .shutdown()
        .map_err(|err| format!("shutdown failed: {err}"))?;
    if stats.allocated != stats.released || stats.live != 0 {
        return Err(format!(
            "statement leak: {} allocated, {} released",
            stats.allocated, stats.released
        ));
    }

    info!(
        commands = summary.commands,
        errors = summary.errors,
        "self-test passed"
    );
    Ok(SelfTestReport {
        commands: summary.commands,
        errors: summary.errors,
    })
}

fn check(expect: &Expect, reply: &Reply) -> Result<(), String> {
    match expect {
        Expect::Reply(expected) if expected == reply => Ok(()),
        Expect::Reply(expected) => Err(format!("expected {expected:?}, got {reply:?}")),
        Expect::Status(status) if reply.status() == *status => Ok(()),
        Expect::Status(status) => Err(format!("expected status {status}, got {reply:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes() {
        let report = run().unwrap();
        assert_eq!(report.commands, script().len() as u64);
        let expected_errors = script()
            .iter()
            .filter(|s| match &s.expect {
                Expect::Status(status) => !status.is_ok(),
                Expect::Reply(reply) => !reply.is_ok(),
            })
            .count();
        assert_eq!(report.errors, expected_errors as u64);
    }

    #[test]
    fn test_check_reports_mismatch() {
        let err = check(&Expect::Reply(Reply::NoRow), &Reply::Ack).unwrap_err();
        assert!(err.contains("expected NoRow"), "{err}");
        assert!(check(&Expect::Status(Status::Ok), &Reply::Ack).is_ok());
        assert!(check(&Expect::Status(Status::Bind), &Reply::Ack).is_err());
    }
}
