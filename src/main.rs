mod cli;

use flocker_script::{ScriptRunner, StandardOptions};

fn main() {
    let options = StandardOptions::new(env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"));
    let code = ScriptRunner::new(cli::DeployScript, options).main();
    std::process::exit(code);
}
