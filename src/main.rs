fn main() -> anyhow::Result<()> {
    actionthing_lib::run()
}
