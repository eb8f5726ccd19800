fn main() {
    if let Err(err) = brokerd::server::run_server() {
        eprintln!("brokerd: {err}");
        std::process::exit(1);
    }
}
