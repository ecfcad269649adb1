//! OPC6 simulator frontend.
//!
//! Provides two execution modes:
//!
//! - **Headless** (default): run the image until it halts, hits a
//!   breakpoint or watchpoint, or the cycle limit. Serial output goes to
//!   stdout; the register dump goes to stderr.
//! - **Step mode** (`--step`): interactive instruction-level debugger with
//!   rewind.
//!
//! Exit status is 0 when the core halted, 1 for any other stop and 2 on
//! error.

mod args;

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;

use opc6_core::snapshot::RewindBuffer;
use opc6_core::{Machine, Space, StopReason, WatchKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::{parse_hex_or_dec, Args, IrqEvent};

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> opc6_core::Result<u8> {
    let config = args.core_config()?;
    let text = std::fs::read_to_string(&args.image)?;
    let mut machine = Machine::new(config);
    let size = machine.load_image(&text)?;
    info!("loaded {} ({} words)", args.image.display(), size);

    if let Some(path) = &args.load_state {
        machine.load_state_file(path)?;
    }
    machine.breakpoints.extend(args.breakpoints.iter().copied());

    if args.profile {
        machine.profiler.start(machine.cpu.state.cycles);
    }

    let code = if args.step {
        run_step_mode(args, &mut machine);
        0
    } else {
        let reason = run_headless(args, &mut machine);
        flush_serial(&mut machine);
        eprintln!("{}", machine.dump_regs());
        match reason {
            StopReason::Halted => 0,
            StopReason::Breakpoint(addr) => {
                eprintln!("*** Breakpoint 0x{:04X}: {} ***", addr, machine.disasm_at_pc());
                1
            }
            StopReason::Watchpoint(hit) => {
                eprintln!("*** {} ***", hit);
                1
            }
            StopReason::CycleLimit => {
                eprintln!("*** Cycle limit ({}) reached ***", args.max_cycles);
                1
            }
        }
    };

    if args.profile {
        machine.profiler.stop(machine.cpu.state.cycles);
        println!("{}", machine.profiler_report());
    }
    if let Some(path) = args.save_state_path() {
        machine.save_state_file(&path)?;
    }
    Ok(code)
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

/// Run to a stop, applying scheduled interrupt levels on the way.
fn run_headless(args: &Args, machine: &mut Machine) -> StopReason {
    let mut irqs: Vec<IrqEvent> = args.irqs.clone();
    irqs.sort_by_key(|e| e.cycle);
    let mut pending = irqs.into_iter().peekable();
    let mut elapsed = 0u64;

    loop {
        while let Some(ev) = pending.next_if(|e| e.cycle <= elapsed) {
            info!("cycle {}: int_b <- {}", elapsed, ev.level);
            machine.set_interrupt(ev.level);
        }
        let budget = match pending.peek() {
            Some(ev) => (ev.cycle - elapsed).min(args.max_cycles - elapsed),
            None => args.max_cycles - elapsed,
        };
        let reason = machine.run(budget);
        if reason != StopReason::CycleLimit {
            return reason;
        }
        elapsed += budget;
        if elapsed >= args.max_cycles {
            return reason;
        }
    }
}

fn flush_serial(machine: &mut Machine) {
    let out = machine.take_serial_output();
    if !out.is_empty() {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&out);
        let _ = stdout.flush();
    }
}

// ─── Step Mode ──────────────────────────────────────────────────────────────

fn run_step_mode(args: &Args, machine: &mut Machine) {
    let mut rewind = RewindBuffer::new(1024, 1);

    println!("Step mode: Enter=step, N<enter>=step N, r=run to break, d=dump, m ADDR [LEN]=memory,");
    println!("           io=I/O latches, w ADDR=watch write, we IDX=enable/disable watch,");
    println!("           uw IDX=remove watch, b=back one step, q=quit");
    println!("{}", machine.dump_regs());
    println!("Next: {}", machine.disasm_at_pc());

    let stdin = std::io::stdin();
    let mut steps = 0usize;
    loop {
        let mut line = String::new();
        print!("step> ");
        let _ = std::io::stdout().flush();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = line.trim();
        let mut words = cmd.split_whitespace();
        match words.next().unwrap_or("") {
            "q" | "quit" => break,
            "d" | "dump" => {
                println!("{}", machine.dump_regs());
                println!("Rewind: {} snapshots, {} KiB", rewind.len(), rewind.memory_usage() / 1024);
                continue;
            }
            "io" => { print!("{}", machine.dump_io()); continue; }
            "m" | "mem" => {
                let start = words.next().and_then(|s| parse_hex_or_dec(s).ok()).unwrap_or(0);
                let len = words.next().and_then(|s| parse_hex_or_dec(s).ok()).unwrap_or(64);
                print!("{}", machine.dump_memory(start, len));
                continue;
            }
            "w" | "watch" => {
                match words.next().and_then(|s| parse_hex_or_dec(s).ok()) {
                    Some(addr) => {
                        machine.board.debugger.add_watchpoint(Space::Data, addr, WatchKind::Write);
                    }
                    None => println!("usage: w ADDR"),
                }
                print!("{}", machine.board.debugger.list_watchpoints());
                continue;
            }
            verb @ ("we" | "uw") => {
                let dbg = &mut machine.board.debugger;
                match words.next().and_then(|s| s.parse::<usize>().ok()) {
                    Some(idx) if verb == "we" => {
                        if dbg.toggle_watchpoint(idx).is_none() {
                            println!("no watchpoint {}", idx);
                        }
                    }
                    Some(idx) => {
                        if !dbg.remove_watchpoint(idx) {
                            println!("no watchpoint {}", idx);
                        }
                    }
                    None => println!("usage: {} IDX", verb),
                }
                print!("{}", dbg.list_watchpoints());
                continue;
            }
            "b" | "back" => {
                match rewind.pop() {
                    Some(snap) => {
                        machine.restore_snapshot(&snap);
                        steps = steps.saturating_sub(1);
                        println!("Rewound ({} left)", rewind.len());
                    }
                    None => println!("Nothing to rewind"),
                }
                println!("Next: {}", machine.disasm_at_pc());
                continue;
            }
            "r" | "run" => {
                rewind.push(machine.save_snapshot());
                let reason = machine.run(args.max_cycles);
                flush_serial(machine);
                match reason {
                    StopReason::Breakpoint(_) => println!("*** Breakpoint: {} ***", machine.disasm_at_pc()),
                    StopReason::Watchpoint(hit) => println!("*** {} ***", hit),
                    StopReason::Halted => println!("*** Halted ***"),
                    StopReason::CycleLimit => println!("*** Cycle limit ***"),
                }
                println!("{}", machine.dump_regs());
                println!("Next: {}", machine.disasm_at_pc());
                continue;
            }
            _ => {}
        }
        let n: usize = cmd.parse().unwrap_or(1);
        for i in 0..n {
            if machine.cpu.halted() {
                println!("  (halted)");
                break;
            }
            if rewind.tick_step() {
                rewind.push(machine.save_snapshot());
            }
            let asm = machine.step_one();
            steps += 1;
            if n <= 20 { println!("  {}", asm); }
            else if i == n - 1 { println!("  ... {} steps, last: {}", n, asm); }
        }
        flush_serial(machine);
        println!("{}", machine.dump_regs());
        println!("Next: {}", machine.disasm_at_pc());
    }
    println!("Total: {} steps, {} cycles", steps, machine.cpu.state.cycles);
}
