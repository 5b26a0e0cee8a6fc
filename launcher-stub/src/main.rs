fn main() {
    std::process::exit(launcher_stub::run());
}
