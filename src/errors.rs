use color_eyre::Result;

/// Install the eyre report handler and a panic hook. Release builds write a
/// crash report through human-panic, debug builds print a full backtrace.
pub fn init_errors() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .display_location_section(cfg!(debug_assertions))
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;

    std::panic::set_hook(Box::new(move |panic_info| {
        error!("{}", strip_ansi_escapes::strip_str(panic_hook.panic_report(panic_info).to_string()));

        #[cfg(not(debug_assertions))]
        {
            use human_panic::{
                handle_dump,
                print_msg,
                Metadata,
            };
            let metadata = Metadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                .authors(env!("CARGO_PKG_AUTHORS").replace(':', ", "))
                .homepage(env!("CARGO_PKG_HOMEPAGE"));
            let file_path = handle_dump(&metadata, panic_info);
            if let Err(err) = print_msg(file_path, &metadata) {
                eprintln!("failed to print panic message: {err}");
            }
        }

        #[cfg(debug_assertions)]
        {
            better_panic::Settings::auto()
                .most_recent_first(false)
                .lineno_suffix(true)
                .verbosity(better_panic::Verbosity::Full)
                .create_panic_handler()(panic_info);
        }

        std::process::exit(1);
    }));
    Ok(())
}
