pub const KHEPER_DISPLAY_VERSION: &str = env!("KHEPER_DISPLAY_VERSION");
pub const KHEPER_BUILD_N: &str = env!("KHEPER_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "kheper {}\nBuild {}\nPaired L1000 / Cell Painting training data preparation",
        KHEPER_DISPLAY_VERSION, KHEPER_BUILD_N
    )
}
