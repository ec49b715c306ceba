fn main() -> anyhow::Result<()> {
    proxy_panel_lib::run()
}
