use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ariadne::{Report, ReportKind, Source};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use synacor_ensemble::disasm::Disassembler;
use synacor_ensemble::sim::debug::Debugger;
use synacor_ensemble::sim::io::StdIO;
use synacor_ensemble::sim::{snapshot, MachineState, SimFlags, Simulator};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Most verbose log level to print to stderr.
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,
}
#[derive(Subcommand)]
enum Command {
    /// Runs a program image until it halts.
    Run {
        input: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Runs a program image under the debugger.
    Debug {
        input: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
        /// Address to set a breakpoint at (can be repeated).
        #[arg(short, long = "break")]
        breakpoints: Vec<u16>,
    },
    /// Lists the instructions of a program image.
    Disasm {
        input: PathBuf,
        /// Address to start listing from.
        #[arg(long, default_value_t = 0)]
        start: u16,
        /// Maximum number of instructions to list.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Resumes a machine from a snapshot file.
    Resume {
        snapshot: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
        /// Resume under the debugger.
        #[arg(long)]
        debug: bool,
    },
}
#[derive(ClapArgs)]
struct ExecArgs {
    /// Treat undefined argument words as masked literals instead of failing.
    #[arg(long)]
    permissive: bool,
}
impl ExecArgs {
    fn simulator(&self) -> Simulator {
        Simulator::new(SimFlags { strict: !self.permissive, ..Default::default() })
    }
}

fn main() -> ExitCode {
    let Args { cmd, log_level } = Args::parse();
    if let Err(e) = SimpleLogger::new().with_level(log_level).init() {
        eprintln!("could not initialize logger: {e}");
    }

    let result = match cmd {
        Command::Run { input, exec } => cmd_run(&input, &exec),
        Command::Debug { input, exec, breakpoints } => cmd_debug(&input, &exec, breakpoints),
        Command::Disasm { input, start, count } => cmd_disasm(&input, start, count),
        Command::Resume { snapshot, exec, debug } => cmd_resume(&snapshot, &exec, debug),
    };

    match result {
        Ok(_)  => ExitCode::SUCCESS,
        Err(e) => e,
    }
}

fn cmd_run(input: &Path, exec: &ExecArgs) -> Result<(), ExitCode> {
    let state = load_image(input)?;
    execute(&exec.simulator(), state, None)
}
fn cmd_debug(input: &Path, exec: &ExecArgs, breakpoints: Vec<u16>) -> Result<(), ExitCode> {
    let state = load_image(input)?;
    let debugger = Debugger::with_breakpoints(breakpoints)
        .map_err(|e| report_error(&e))?;

    execute(&exec.simulator(), state, Some(debugger))
}
fn cmd_disasm(input: &Path, start: u16, count: Option<usize>) -> Result<(), ExitCode> {
    let state = load_image(input)?;

    let lines = Disassembler::starting_at(&state.mem, start)
        .take(count.unwrap_or(usize::MAX));
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
fn cmd_resume(path: &Path, exec: &ExecArgs, debug: bool) -> Result<(), ExitCode> {
    let state = snapshot::read_file(path)
        .map_err(|e| report_error(&e))?;
    log::info!("resuming from {} at pc {}", path.display(), state.pc);

    let debugger = debug.then(Debugger::new);
    execute(&exec.simulator(), state, debugger)
}

fn execute(sim: &Simulator, mut state: MachineState, debugger: Option<Debugger>) -> Result<(), ExitCode> {
    let result = match debugger {
        Some(mut dbg) => dbg.run(sim, &mut state, &mut StdIO, &mut StdIO),
        None => sim.run(&mut state, &mut StdIO),
    };

    result.map_err(|e| report_error(&e))
}

fn load_image(input: &Path) -> Result<MachineState, ExitCode> {
    let bytes = handle_read(input, std::fs::read)?;
    MachineState::from_image_bytes(&bytes)
        .map_err(|e| report_error(&e))
}

fn handle_read<'p, T>(input: &'p Path, read: impl FnOnce(&'p Path) -> std::io::Result<T>) -> Result<T, ExitCode> {
    read(input)
        .map_err(|e| {
            Report::<Range<_>>::build(ReportKind::Error, (), 0)
                .with_message(format!("{}: {e}", input.display()))
                .finish()
                .eprint(Source::from(""))
                .unwrap();
            
            ExitCode::FAILURE
        })
}
fn report_error<E: synacor_ensemble::err::Error>(err: &E) -> ExitCode {
    let mut report = Report::<Range<_>>::build(ReportKind::Error, (), 0)
        .with_message(err);

    if let Some(help) = err.help() {
        report.set_help(help);
    }

    report
        .finish()
        .eprint(Source::from(""))
        .unwrap();

    ExitCode::FAILURE
}
