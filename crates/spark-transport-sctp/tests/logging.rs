//! 日志初始化只能成功一次。

use spark_transport_sctp::{LoggingError, init_tracing};

#[test]
fn second_install_reports_existing_subscriber() {
    init_tracing().expect("首次安装");
    tracing::info!("sctp tracing installed");
    assert!(matches!(
        init_tracing().expect_err("重复安装"),
        LoggingError::SubscriberAlreadySet
    ));
}
