//! API 版本信息处理器。

use axum::response::Json as JsonResponse;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    version: &'static str,
    build_time: &'static str,
    build_env: String,
}

/// 返回当前版本信息。
pub async fn get_version_info() -> JsonResponse<VersionInfo> {
    JsonResponse(VersionInfo {
        version: crate::build::PKG_VERSION,
        build_time: crate::build::BUILD_TIME,
        build_env: format!(
            "{},{}",
            crate::build::RUST_VERSION,
            crate::build::RUST_CHANNEL
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::get_version_info;

    #[tokio::test]
    async fn reports_package_version() {
        let info = get_version_info().await.0;
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.build_env.contains(','));
    }
}
