error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Toml(::toml::de::Error);
    }

    errors {
        InvalidCommand(c: String) {
            description("invalid command")
            display("invalid command: {}", c)
        }

        BadPeer(id: usize) {
            description("no such peer")
            display("no such peer: {}", id)
        }
    }
}
