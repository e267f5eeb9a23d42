use colored::Colorize;

fn main() {
    match dmk::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:?}", "ERROR".red(), e);
            std::process::exit(1);
        }
    }
}
