fn main() {
    if let Err(err) = resync::run_entry() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
