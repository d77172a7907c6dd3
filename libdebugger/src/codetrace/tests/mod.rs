use super::output::{TraceLog, TraceOutput};


fn output(instruction: &str, memory_target: Option<u32>) -> TraceOutput {
    let output = TraceOutput::new(0x8000_0000, instruction);

    match memory_target {
        Some(target) => output.with_memory_target(target),
        None => output,
    }
}

fn log_of(lines: &[&str]) -> TraceLog {
    let mut log = TraceLog::new(lines.len().max(1));

    for line in lines {
        assert!(log.push(line.parse().expect("Bad test log line")));
    }

    log
}
