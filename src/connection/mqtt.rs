//! MQTT broker 客户端（基于 rumqttc）
//!
//! - 连接时等待 CONNACK 再返回
//! - 之后由后台任务驱动事件循环，把 PubAck/PubComp 和连接错误转成观察者回调
//! - 事件循环出错后不自动重连，由连接管理器决定何时重连

use anyhow::{anyhow, Result};
use rumqttc::tokio_rustls::rustls;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, TlsConfiguration, Transport};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::broker::{BrokerClient, ConnectionObserver, QoS};
use crate::config::ConnectionConfig;

/// Outgoing request buffer of the rumqttc client
const REQUEST_CAPACITY: usize = 64;

struct Session {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

/// MQTT 客户端
#[derive(Default)]
pub struct MqttClient {
    session: Mutex<Option<Session>>,
}

impl MqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// 构建 rumqttc 连接参数
pub fn build_options(config: &ConnectionConfig) -> Result<MqttOptions> {
    let address = config.address()?;

    let mut options = MqttOptions::new(config.client_id.clone(), address.host.clone(), address.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);

    if let Some((username, password)) = config.credentials() {
        options.set_credentials(username, password);
    }

    if address.is_tls() {
        let transport = if config.accept_self_signed_certs {
            Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(accept_any_cert_config())))
        } else {
            Transport::tls_with_default_config()
        };
        options.set_transport(transport);
    }

    Ok(options)
}

async fn drive(mut eventloop: EventLoop, observer: Arc<dyn ConnectionObserver>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(ack))) => observer.on_delivered(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => observer.on_delivered(comp.pkid),
            Ok(_) => {}
            Err(e) => {
                observer.on_lost(&e.to_string());
                break;
            }
        }
    }
}

impl BrokerClient for MqttClient {
    async fn connect(
        &self,
        config: &ConnectionConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<()> {
        // 丢弃旧会话，避免其回调影响新连接
        if let Some(old) = self.take_session() {
            old.driver.abort();
        }

        let options = build_options(config)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(session_present = ack.session_present, "Received CONNACK");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("MQTT connect failed: {}", e)),
            }
        }

        let driver = tokio::spawn(drive(eventloop, observer));
        let displaced = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Session { client, driver });
        // a displaced driver must not report its shutdown as a lost connection
        if let Some(old) = displaced {
            old.driver.abort();
        }
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let session = guard
            .as_ref()
            .ok_or_else(|| anyhow!("MQTT client not connected"))?;
        session
            .client
            .try_publish(topic, to_mqtt_qos(qos), false, payload)
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))
    }

    async fn disconnect(&self) {
        if let Some(session) = self.take_session() {
            let _ = session.client.try_disconnect();
            session.driver.abort();
            info!("Disconnected from MQTT broker");
        }
    }
}

/// TLS 配置：接受任何服务端证书（自签名 broker）
fn accept_any_cert_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::AcceptAnyServerCert))
        .with_no_client_auth()
}

mod danger {
    use super::rustls;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    pub struct AcceptAnyServerCert;

    impl ServerCertVerifier for AcceptAnyServerCert {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ECDSA_NISTP521_SHA512,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::ED25519,
            ]
        }
    }
}
