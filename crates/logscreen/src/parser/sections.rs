//! Sections — built-in grammar for emulator logs.
//!
//! A log starts with a build banner, dumps system information, then the
//! active configuration (core, VFS, video, audio/input/system, log channels),
//! and finally the runtime log of the emulated title.

use super::grammar::{Grammar, GrammarError, SectionBuilder};

const START_MARKER: &str = "RPCS3 v";

/// Fields that keep every distinct value seen.
const MULTI_VALUE_FIELDS: &[&str] = &[
    "pad_handler",
    "pad_controller_name",
    "fatal_error_context",
    "fatal_error",
    "rap_file",
    "vulkan_found_device",
    "vulkan_compatible_device_name",
    "ppu_patch",
    "ovl_patch",
    "spu_patch",
    "prx_patch",
    "patch_desc",
    "broken_filename",
    "broken_directory",
    "edat_block_offset",
    "rsx_not_supported_feature",
    "vk_ext",
    "gl_ext",
    "verification_error_hex",
    "verification_error",
    "tty_line",
    "log_disabled_channel",
];

/// `Name: value` configuration line.
fn setting(section: SectionBuilder, name: &str, field: &str) -> SectionBuilder {
    let pattern = format!(r"{}: (?P<{}>.*?)\s*$", regex::escape(name), field);
    section.field(field, pattern)
}

fn settings(mut section: SectionBuilder, pairs: &[(&str, &str)]) -> SectionBuilder {
    for (name, field) in pairs {
        section = setting(section, name, field);
    }
    section
}

fn header() -> SectionBuilder {
    SectionBuilder::new("header")
        .field("build", r"(?P<build_and_specs>RPCS3 v\S.*?)\s*$")
        .field(
            "os",
            r"Operating system: (?P<os_type>[^,]+), (?:Name: (?P<posix_name>[^,]+), Release: (?P<posix_release>[^,]+), Version: (?P<posix_version>.+)|Major: (?P<os_version_major>\d+), Minor: (?P<os_version_minor>\d+), Build: (?P<os_version_build>\d+))",
        )
        .field("current_time", r"Current Time: (?P<log_start_timestamp>.+?)\s*$")
        .field("installation_id", r"Installation ID: (?P<hw_id>.+?)\s*$")
        .field(
            "vulkan_device",
            r"Physical device ini?tialized\. GPU=(?P<vulkan_gpu>.+), driver=(?P<vulkan_driver_version_raw>-?\d+)",
        )
        .field(
            "vulkan_found",
            r"Found [Vv]ulkan-compatible GPU: (?P<vulkan_found_device>'(?P<vulkan_compatible_device_name>.+)' running.+?)\s*$",
        )
        .field(
            "compat_db",
            r"(?:Finished reading database from file|Database file not found): (?P<compat_database_path>.*compat_database\.dat)",
        )
        .field("fw_version", r"Firmware version: (?P<fw_version_installed>\d+\.\d+)")
        .field("title", r"(?:LDR|SYS): Title: (?P<game_title>.*?)\s*$")
        .field("serial", r"Serial: (?P<serial>[A-Za-z]{4}\d{5})\s*$")
        .field("category", r"Category: (?P<game_category>.*?)\s*$")
        .field(
            "disc_version",
            r"Version: (?:APP_VER=)?(?P<disc_app_version>\S+) (?:/ |VERSION=)(?P<disc_package_version>\S+)",
        )
        .field(
            "boot_path",
            r"(?:LDR|SYS): Path: (?P<ldr_path_full>.*?(?P<ldr_path>/dev_hdd0/game/(?P<ldr_path_serial>[^/]+)).*|.*?)\s*$",
        )
        .field("custom_config", r"custom config: (?P<custom_config>.*?)\s*$")
        .end_trigger("Used configuration:")
}

fn core() -> SectionBuilder {
    settings(
        SectionBuilder::new("core"),
        &[
            ("PPU Decoder", "ppu_decoder"),
            ("PPU Threads", "ppu_threads"),
            ("Use LLVM CPU", "llvm_arch"),
            ("SPU Decoder", "spu_decoder"),
            ("SPU Threads", "spu_threads"),
            ("Max SPURS Threads", "spurs_threads"),
            ("SPU Block Size", "spu_block_size"),
            ("Enable TSX", "enable_tsx"),
            ("XFloat Accuracy", "xfloat_mode"),
            ("Accurate GETLLAR", "accurate_getllar"),
            ("Accurate PUTLLUC", "accurate_putlluc"),
            ("RSX FIFO Accuracy", "rsx_fifo_mode"),
            ("Lib Loader", "lib_loader"),
            ("Hook static functions", "hook_static_functions"),
            ("HLE lwmutex", "hle_lwmutex"),
            ("Clocks scale", "clock_scale"),
            ("Sleep Timers Accuracy", "sleep_timer"),
        ],
    )
    .field("thread_scheduler", r"[Ss]cheduler(?: Mode)?: (?P<thread_scheduler>.*?)\s*$")
    .end_trigger("VFS:")
}

fn vfs() -> SectionBuilder {
    setting(SectionBuilder::new("vfs"), "Enable /host_root/", "host_root").end_trigger("Video:")
}

fn video() -> SectionBuilder {
    settings(
        SectionBuilder::new("video"),
        &[
            ("Renderer", "renderer"),
            ("Resolution", "resolution"),
            ("Aspect ratio", "aspect_ratio"),
            ("Frame limit", "frame_limit"),
            ("MSAA", "msaa"),
            ("Write Color Buffers", "write_color_buffers"),
            ("Write Depth Buffer", "write_depth_buffer"),
            ("Read Color Buffers", "read_color_buffers"),
            ("Read Depth Buffer", "read_depth_buffer"),
            ("VSync", "vsync"),
            ("Strict Rendering Mode", "strict_rendering_mode"),
            ("Shader Mode", "shader_mode"),
            ("Multithreaded RSX", "mtrsx"),
            ("Resolution Scale", "resolution_scale"),
            ("Anisotropic Filter Override", "af_override"),
            ("Vblank Rate", "vblank_rate"),
        ],
    )
    .field(
        "async_texture_streaming",
        r"Asynchronous Texture Streaming(?: 2)?: (?P<async_texture_streaming>.*?)\s*$",
    )
    .end_trigger("Audio:")
}

fn audio_io_system() -> SectionBuilder {
    settings(
        SectionBuilder::new("audio_io_system"),
        &[
            ("Renderer", "audio_backend"),
            ("Downmix to Stereo", "audio_stereo"),
            ("Master Volume", "audio_volume"),
            ("Enable Buffering", "audio_buffering"),
            ("Desired Audio Buffer Duration", "audio_buffer_duration"),
            ("Enable Time Stretching", "audio_stretching"),
            ("Pad", "pad_handler"),
            ("Automatically start games after boot", "auto_start_on_boot"),
            ("Always start after boot", "always_start_on_boot"),
            ("Use native user interface", "native_ui"),
            ("Silence All Logs", "disable_logs"),
        ],
    )
    .end_trigger("Log:")
}

fn log_channels() -> SectionBuilder {
    SectionBuilder::new("log_channels")
        .field("channel", r"^\s+(?P<log_disabled_channel>\w+:\s*\w+)\s*$")
        .end_trigger("·")
}

fn runtime() -> SectionBuilder {
    SectionBuilder::new("runtime")
        .field("game_path", r"(?:LDR|SYS): Game: (?P<ldr_game_full>.*?)\s*$")
        .field(
            "elf_path",
            r"Elf path: (?P<host_root_in_boot>/host_root/)?(?P<elf_boot_path_full>.*?)\s*$",
        )
        .field("mounted_bdvd", r#"Mounted path "/dev_bdvd" to "(?P<mounted_dev_bdvd>[^"]+)""#)
        .field("invalid_format", r"Invalid or unsupported file format: (?P<failed_to_boot>.*?)\s*$")
        .field(
            "game_version",
            r"SYS: Version: (?:APP_VER=)?(?P<disc_app_version>\S+) (?:/ |VERSION=)(?P<disc_package_version>\S+)",
        )
        .field("gl_renderer", r"GL RENDERER: (?P<driver_manuf_new>.*?)\s*$")
        .field("gl_version", r"GL VERSION: (?P<opengl_version>[\d.]+)")
        .field(
            "vulkan_initialized",
            r"Renderer initialized on device '(?P<vulkan_initialized_device>.+)'",
        )
        .field(
            "shader_error",
            r"RSX: (?:Failed to compile shader|Compilation failed): ERROR: (?P<shader_compile_error>.+?)\s*$",
        )
        .field(
            "unsupported_feature",
            r"RSX: (?:Your GPU does not support|GPU/driver lacks support for) (?P<rsx_not_supported_feature>.+?)\.",
        )
        .field("vk_ext", r"RSX: \*\* Using (?P<vk_ext>\w+)")
        .field("gl_ext", r"RSX: \[CAPS\] Using (?P<gl_ext>\w+)")
        .field(
            "fatal_error",
            r"^F \d+:\d+:\d+\.\d+ (?:\{(?P<fatal_error_context>[^}]+)\} )?(?:\w+:\s*)?(?:Thread terminated due to fatal error: )?(?P<fatal_error>.+?)\s*$",
        )
        .field("rap_file", r"(?:Failed to load RAP file|Rap file not found): “?(?P<rap_file>.*?\.rap)")
        .field(
            "pad",
            r"Input: Pad (?P<pad_id>\d): device='(?P<pad_controller_name>.+?)', handler=(?P<pad_handler>.+?), VID=",
        )
        .field("ppu_hash", r"PPU executable hash: PPU-(?P<ppu_patch>\w+)")
        .field("ovl_hash", r"OVL executable hash: OVL-(?P<ovl_patch>\w+)")
        .field("spu_hash", r"SPU executable hash: SPU-(?P<spu_patch>\w+)")
        .field("prx_hash", r"PRX library hash: PRX-(?P<prx_patch>\w+-\d+)")
        .field("applied_patch", r"Applied patch \(hash='[^']+', description='(?P<patch_desc>.+?)'")
        .field("broken_file", r"'sys_fs_open' failed .+“/dev_bdvd/(?P<broken_filename>.+)”")
        .field("broken_directory", r"'sys_fs_opendir' failed .+“/dev_bdvd/(?P<broken_directory>.+)”")
        .field(
            "invalid_edat",
            r"EDAT: Block at offset (?P<edat_block_offset>0x[0-9a-f]+) has invalid hash",
        )
        .field("fw_missing", r"(?P<fw_missing_msg>PS3 firmware is not installed.+?)\s*$")
        .field("unimplemented_syscall", r"Unimplemented syscall (?P<unimplemented_syscall>.*?)\s*$")
        .field(
            "verification",
            r"Verification failed.+\(e=0x(?P<verification_error_hex>[0-9a-f]+)\[(?P<verification_error>\d+)\]\)",
        )
        .field("tty", r"sys_tty_write\(\): “(?P<tty_line>.*?)”")
        .field("game_mod", r"(?i)(?:\b|_)(?P<game_mod>undub|translation patch)(?:\b|_)")
        .category(
            "ppu_syscall",
            r"\{PPU\[.+\]\} (?P<log_channel>[^ :]+)(?: TODO)?: (?P<syscall_name>[^ :“(]+)\(",
            "serial",
            "syscall_name",
        )
        .category("syscall_dump", r"⁂ (?P<syscall_name>[^ :\[]+) ", "serial", "syscall_name")
        .end_trigger("Stopping emulator...")
        .end_trigger("All threads stopped...")
        .end_trigger("LDR: Booting from")
}

/// The built-in emulator log grammar.
pub fn emulator_log() -> Result<Grammar, GrammarError> {
    Grammar::builder()
        .start_marker(START_MARKER)
        .multi_value(MULTI_VALUE_FIELDS.iter().copied())
        .section(header())
        .section(core())
        .section(vfs())
        .section(video())
        .section(audio_io_system())
        .section(log_channels())
        .section(runtime())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ContentFilter;
    use crate::parser::machine::{LogParser, ParserLimits};
    use crate::parser::model::ErrorCode;
    use std::sync::Arc;

    const SAMPLE: &str = "\
Some launcher noise
RPCS3 v0.0.30-15678-abcdef12 Alpha | master
·! 0:00:00.000000 Operating system: Windows, Major: 10, Minor: 0, Build: 22631, Service Pack: none, Compatibility mode: 0
·! 0:00:00.000100 Current Time: 2024-01-01T12:00:00
·! 0:00:05.000000 SYS: Title: Demon's Souls
·! 0:00:05.000001 SYS: Serial: BLUS30443
Used configuration:
Core:
  PPU Decoder: Recompiler (LLVM)
  PPU Threads: 2
  Thread Scheduler Mode: Operating System
VFS:
  Enable /host_root/: false
Video:
  Renderer: Vulkan
  Resolution: 1280x720
Audio:
  Renderer: Cubeb
Input/Output:
  Pad: Keyboard
Log:
  RSX: Notice
·! 0:00:05.500000 SYS: Booting
·! 0:00:06.000000 {PPU[0x1000000] Thread (main_thread) [0x00012345]} sys_fs: sys_fs_open(path=\"/dev_bdvd\")
·! 0:00:06.000001 {PPU[0x1000000] Thread (main_thread) [0x00012345]} sys_net TODO: sys_net_bnet_socket()
·! 0:00:06.000002 {PPU[0x1000000] Thread (main_thread) [0x00012345]} sys_fs: sys_fs_open(path=\"/dev_hdd0\")
·! 0:00:07.000000 Input: Pad 0: device='DualShock 4', handler=DualShock 4, VID=0x054C
·! 0:00:07.000001 Input: Pad 1: device='DualShock 4', handler=DualShock 4, VID=0x054C
F 0:00:10.000000 {PPU[0x1000000] Thread} VM: Access violation reading location 0x0
·! 0:00:11.000000 Stopping emulator...
·! 0:00:12.000000 trailing line after completion
";

    fn parse(sample: &str) -> crate::parser::model::ParseResult {
        let grammar = Arc::new(emulator_log().unwrap());
        LogParser::new(grammar, Arc::new(ContentFilter::new()), ParserLimits::default()).parse_bytes(sample.as_bytes())
    }

    #[test]
    fn test_grammar_builds() {
        let grammar = emulator_log().unwrap();
        let names: Vec<&str> = grammar.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["header", "core", "vfs", "video", "audio_io_system", "log_channels", "runtime"]
        );
        assert!(grammar.has_start_markers());
    }

    #[test]
    fn test_sample_log_completes_all_sections() {
        let result = parse(SAMPLE);
        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.completed_sections.len(), 7);
        assert_eq!(result.incomplete_section, None);
    }

    #[test]
    fn test_sample_log_header_fields() {
        let result = parse(SAMPLE);
        assert_eq!(result.field("build_and_specs"), Some("RPCS3 v0.0.30-15678-abcdef12 Alpha | master"));
        assert_eq!(result.field("os_type"), Some("Windows"));
        assert_eq!(result.field("os_version_build"), Some("22631"));
        assert_eq!(result.field("game_title"), Some("Demon's Souls"));
        assert_eq!(result.field("serial"), Some("BLUS30443"));
    }

    #[test]
    fn test_sample_log_settings_per_section() {
        let result = parse(SAMPLE);
        assert_eq!(result.field("ppu_decoder"), Some("Recompiler (LLVM)"));
        assert_eq!(result.field("thread_scheduler"), Some("Operating System"));
        assert_eq!(result.field("host_root"), Some("false"));
        assert_eq!(result.field("renderer"), Some("Vulkan"));
        assert_eq!(result.field("audio_backend"), Some("Cubeb"));
        assert_eq!(result.multi_values["pad_handler"], vec!["Keyboard", "DualShock 4"]);
        assert_eq!(result.multi_values["log_disabled_channel"], vec!["RSX: Notice"]);
    }

    #[test]
    fn test_sample_log_runtime() {
        let result = parse(SAMPLE);

        let syscalls: Vec<&str> = result.categories["BLUS30443"].iter().map(String::as_str).collect();
        assert_eq!(syscalls, vec!["sys_fs_open", "sys_net_bnet_socket"]);

        assert_eq!(result.multi_values["pad_controller_name"], vec!["DualShock 4"]);
        assert_eq!(result.hit_counts["pad_controller_name"], 2);
        assert_eq!(result.multi_values["fatal_error"], vec!["Access violation reading location 0x0"]);
        assert_eq!(
            result.multi_values["fatal_error_context"],
            vec!["PPU[0x1000000] Thread"]
        );
    }

    #[test]
    fn test_sample_log_stops_at_completion() {
        let result = parse(SAMPLE);
        let trailing = SAMPLE.lines().last().unwrap().len() as u64 + 1;
        assert_eq!(result.bytes_read, SAMPLE.len() as u64 - trailing);
    }

    #[test]
    fn test_truncated_log_reports_open_section() {
        let cut = SAMPLE.find("Audio:").unwrap();
        let result = parse(&SAMPLE[..cut]);
        assert_eq!(result.error, ErrorCode::None);
        assert_eq!(result.completed_sections, vec!["header", "core", "vfs"]);
        assert_eq!(result.incomplete_section.as_deref(), Some("video"));
        assert_eq!(result.field("renderer"), None);
    }
}
