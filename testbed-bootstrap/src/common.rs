pub const DEFAULT_STATE_FILE: &str = "/var/lib/testbed-bootstrap/state.toml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/testbed-bootstrap.log";
pub const KERNEL_HELPER_PATH: &str = "/tmp/ubuntu-mainline-kernel.sh";
pub const WRITEBACK_CPUMASK_PATH: &str = "/sys/bus/workqueue/devices/writeback/cpumask";
pub const IRQBALANCE_SERVICE: &str = "irqbalance";

// compilers, TLS/crypto, protobuf, libevent and gtest for the consensus build
pub const DEPENDENCY_PACKAGES: &[&str] = &[
    "build-essential",
    "cmake",
    "git",
    "pkg-config",
    "libssl-dev",
    "libsodium-dev",
    "protobuf-compiler",
    "libprotobuf-dev",
    "libevent-dev",
    "libgtest-dev",
];
