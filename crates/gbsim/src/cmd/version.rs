use gbsim_protocol::ProtocolClass;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("gbsim {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: gbsim");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("GBSIM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "greybus: {}.{}",
        gbsim_frame::GREYBUS_VERSION_MAJOR,
        gbsim_frame::GREYBUS_VERSION_MINOR
    );
    println!("protocols: {}", handled_protocols().join(", "));
    println!("backends: none, simulated");

    Ok(SUCCESS)
}

fn handled_protocols() -> Vec<&'static str> {
    (0..=u8::MAX)
        .filter_map(|id| ProtocolClass::try_from(id).ok())
        .filter(|class| class.has_handler())
        .map(ProtocolClass::name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_protocols_with_handlers() {
        let protocols = handled_protocols();
        assert!(protocols.contains(&"pwm"));
        assert!(protocols.contains(&"gpio"));
        assert!(!protocols.contains(&"camera"));
    }
}
