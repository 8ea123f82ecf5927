use std::{
    collections::{BTreeMap, BTreeSet},
    env,
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// 构建脚本入口：读取内核 ABI 契约，生成 `OUT_DIR/kernel_abi.rs`。
///
/// # 教案式说明（Why）
/// - 结构体尺寸、option 编号与通知判别值若散落在源码各处，极易与内核头文件漂移；
/// - 将其集中在 `contracts/sctp_abi.toml`，编译期渲染为常量模块，实现“契约即代码”。
///
/// # 契约定义（What）
/// - 输入：仓库根目录下的 `contracts/sctp_abi.toml`；
/// - 前置条件：每个分组的 `ty` 为 `usize`/`i32`/`u16` 之一，常量名与通知判别值不可重复；
/// - 后置条件：在 `OUT_DIR` 输出生成文件，由 `spark_codec_sctp::abi` 通过 `include!` 引入。
///
/// # 逻辑解析（How）
/// 1. 解析契约并做重复性校验；
/// 2. 每个分组渲染为一个子模块，常量按名称排序保证输出稳定；
/// 3. 通知列表额外渲染为 `NOTIFICATIONS` 查找表。
fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let contract_path = manifest_dir.join("../../contracts/sctp_abi.toml");
    println!("cargo:rerun-if-changed={}", contract_path.display());

    let contract = read_contract(&contract_path);
    validate(&contract);
    let generated = render(&contract);

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    fs::write(out_dir.join("kernel_abi.rs"), generated).expect("写入 kernel_abi.rs");
}

/// 契约文件顶层结构。
#[derive(Debug, Deserialize)]
struct AbiContract {
    group: Vec<ConstGroup>,
    notification: Vec<NotificationEntry>,
}

/// 一组同类型常量，渲染为独立子模块。
#[derive(Debug, Deserialize)]
struct ConstGroup {
    module: String,
    ty: String,
    doc: String,
    entries: BTreeMap<String, i64>,
}

/// 单个通知判别值及其定长部分尺寸。
#[derive(Debug, Deserialize)]
struct NotificationEntry {
    name: String,
    value: u16,
    size: usize,
}

fn read_contract(path: &Path) -> AbiContract {
    let raw = fs::read_to_string(path).unwrap_or_else(|err| {
        panic!("读取 {path:?} 失败: {err}");
    });
    toml::from_str(&raw).unwrap_or_else(|err| {
        panic!("解析 {path:?} 失败: {err}");
    })
}

/// 校验契约的结构性约束，任何违规都直接终止构建。
fn validate(contract: &AbiContract) {
    let mut modules = BTreeSet::new();
    for group in &contract.group {
        assert!(
            matches!(group.ty.as_str(), "usize" | "i32" | "u16"),
            "分组 {} 的类型 {} 不受支持",
            group.module,
            group.ty
        );
        assert!(
            modules.insert(group.module.as_str()),
            "分组 {} 重复声明",
            group.module
        );
        for (name, value) in &group.entries {
            let fits = match group.ty.as_str() {
                "usize" => *value >= 0,
                "i32" => i32::try_from(*value).is_ok(),
                _ => u16::try_from(*value).is_ok(),
            };
            assert!(fits, "{}::{name} = {value} 超出 {} 的取值范围", group.module, group.ty);
        }
    }

    let mut values = BTreeSet::new();
    for notification in &contract.notification {
        assert!(
            notification.name.starts_with("SCTP_"),
            "通知名 {} 需以 SCTP_ 开头",
            notification.name
        );
        assert!(
            values.insert(notification.value),
            "通知判别值 {:#06x} 重复",
            notification.value
        );
    }
}

fn render(contract: &AbiContract) -> String {
    let mut buffer = String::new();
    buffer.push_str("// @generated 自动生成文件，请勿手工修改。\n");
    buffer.push_str("// 由 spark-codec-sctp/build.rs 根据 contracts/sctp_abi.toml 生成。\n\n");

    for group in &contract.group {
        writeln!(buffer, "#[doc = {:?}]", group.doc).expect("render doc");
        writeln!(buffer, "pub mod {} {{", group.module).expect("render module");
        for (name, value) in &group.entries {
            writeln!(buffer, "    pub const {name}: {} = {value};", group.ty).expect("render const");
        }
        buffer.push_str("}\n\n");
    }

    buffer.push_str("/// 通知判别值常量。\n");
    buffer.push_str("pub mod notification {\n");
    for notification in &contract.notification {
        let short = notification.name.trim_start_matches("SCTP_");
        writeln!(
            buffer,
            "    pub const {short}: u16 = {:#06x};",
            notification.value
        )
        .expect("render notification const");
    }
    buffer.push_str("}\n\n");

    buffer.push_str("/// `(判别值, 规范名称, 定长尺寸)` 查找表，按判别值升序排列。\n");
    buffer.push_str("pub const NOTIFICATIONS: &[(u16, &str, usize)] = &[\n");
    let mut ordered: Vec<&NotificationEntry> = contract.notification.iter().collect();
    ordered.sort_by_key(|entry| entry.value);
    for notification in ordered {
        writeln!(
            buffer,
            "    ({:#06x}, {:?}, {}),",
            notification.value, notification.name, notification.size
        )
        .expect("render notification row");
    }
    buffer.push_str("];\n");
    buffer
}
