// パス: src/bin/swift-to-js.rs
// 役割: 変換器のコマンドライン入口（引数解析・ログ初期化・出力）
// 意図: ファイル一つを JavaScript に変換し、標準出力か指定ファイルへ書き出す
// 関連ファイル: src/driver.rs, src/lib.rs
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, LevelFilter};

use swifttojs::driver::{self, CompileOptions, InputKind};
use swifttojs::js::printer::{print_program, PrinterOptions};

#[derive(Parser, Debug)]
#[command(name = "swift-to-js")]
#[command(version)]
#[command(about = "Swift の AST ダンプ / SIL を JavaScript に変換する", long_about = None)]
struct Cli {
    /// 入力ファイル（.sil / .ast / .json）
    #[arg(required = true)]
    input: PathBuf,

    /// 出力先（省略時は標準出力）
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// 入力の種類（省略時は拡張子と内容から推定）
    #[arg(long, value_enum)]
    input_kind: Option<InputKind>,

    /// インデント幅
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// トラップ補助関数を出力しない
    #[arg(long)]
    no_helpers: bool,

    /// 変換後に組み込みのインタプリタで実行し、console.log の出力を表示する
    #[arg(long)]
    run: bool,

    /// ログを詳しくする（-v: info, -vv: debug, -vvv: trace）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or("SWIFT_TO_JS_LOG", "warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Info);
        }
        2 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn run(cli: &Cli) -> driver::DriverResult<()> {
    let source = std::fs::read_to_string(&cli.input)?;
    let options = CompileOptions {
        input: cli
            .input_kind
            .or_else(|| InputKind::from_path(&cli.input)),
        emit_helpers: !cli.no_helpers,
        print: PrinterOptions { indent: cli.indent },
    };
    let program = driver::compile_program(&source, &options)?;
    let text = print_program(&program, &options.print);
    match &cli.output {
        Some(path) => driver::write_output(path, &text)?,
        None if !cli.run => print!("{}", text),
        None => {}
    }
    if cli.run {
        for line in driver::run_program(&program)? {
            println!("{}", line);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    if let Err(e) = run(&cli) {
        error!("{}: {}", cli.input.display(), e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
