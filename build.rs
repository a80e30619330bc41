use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（--version 中显示构建时间）
    EmitBuilder::builder()
        .all_build()
        .emit()
        .expect("Failed to generate build information");
}
