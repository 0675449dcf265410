// 该文件是 Qupu （曲谱） 项目的一部分。
// src/output/roboflow.rs - Roboflow 数据集上传
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::Path, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{AnnotationPayload, Upload};
use crate::{
  FromUrl, FromUrlWithScheme, annotation::Annotation, config::ApiKey, split::Split,
};

const DEFAULT_ENDPOINT: &str = "https://api.roboflow.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("qupu/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum RoboflowUploadError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的 Roboflow 地址: {0}")]
  InvalidUrl(String),
  #[error("HTTP 错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("接口返回错误 {0}: {1}")]
  ApiError(u16, String),
  #[error("接口返回无法识别的内容: {0}")]
  UnexpectedResponse(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
  id: Option<String>,
  #[serde(default)]
  duplicate: bool,
}

/// `roboflow://<workspace>/<project>[?endpoint=<base url>]`
pub struct RoboflowUploadBuilder {
  workspace: String,
  project: String,
  endpoint: String,
  timeout: Duration,
}

impl FromUrl for RoboflowUploadBuilder {
  type Error = RoboflowUploadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != RoboflowUploadBuilder::SCHEME {
      error!(
        "URI 方案不匹配：期望 '{}'，实际为 '{}'",
        RoboflowUploadBuilder::SCHEME,
        url.scheme()
      );
      return Err(RoboflowUploadError::SchemeMismatch);
    }

    let workspace = url
      .host_str()
      .filter(|host| !host.is_empty())
      .ok_or_else(|| RoboflowUploadError::InvalidUrl(format!("{} 缺少工作区", url)))?
      .to_string();
    let project = url
      .path_segments()
      .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
      .ok_or_else(|| RoboflowUploadError::InvalidUrl(format!("{} 缺少项目名", url)))?
      .to_string();

    let mut endpoint = DEFAULT_ENDPOINT.to_string();
    for (key, value) in url.query_pairs() {
      if key == "endpoint" {
        endpoint = value.trim_end_matches('/').to_string();
      }
    }

    Ok(Self {
      workspace,
      project,
      endpoint,
      timeout: DEFAULT_TIMEOUT,
    })
  }
}

impl RoboflowUploadBuilder {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// 密钥在构造 [`ApiKey`] 时已校验
  pub fn build(self, api_key: ApiKey) -> Result<RoboflowUpload, RoboflowUploadError> {
    let client = Client::builder()
      .user_agent(USER_AGENT)
      .timeout(self.timeout)
      .build()?;

    info!(
      "上传目标: {}/{} ({})",
      self.workspace, self.project, self.endpoint
    );

    Ok(RoboflowUpload {
      project: self.project,
      endpoint: self.endpoint,
      api_key,
      client,
    })
  }
}

/// 先上传图像，再把标注挂到返回的图像 id 上
pub struct RoboflowUpload {
  project: String,
  endpoint: String,
  api_key: ApiKey,
  client: Client,
}

impl FromUrlWithScheme for RoboflowUploadBuilder {
  const SCHEME: &'static str = "roboflow";
}

impl RoboflowUpload {
  fn api_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, RoboflowUploadError> {
    let base = format!("{}/dataset/{}/{}", self.endpoint, self.project, path);
    let params = std::iter::once(("api_key", self.api_key.expose())).chain(params.iter().copied());
    Url::parse_with_params(&base, params)
      .map_err(|err| RoboflowUploadError::InvalidUrl(format!("{}: {}", base, err)))
  }

  fn post(&self, url: Url, content_type: &str, body: String) -> Result<String, RoboflowUploadError> {
    let response = self
      .client
      .post(url)
      .header(CONTENT_TYPE, content_type)
      .body(body)
      .send()?;
    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
      return Err(RoboflowUploadError::ApiError(status.as_u16(), text));
    }
    Ok(text)
  }

  fn upload_image(&self, image: &Path, name: &str, split: Option<Split>) -> Result<String, RoboflowUploadError> {
    let body = STANDARD.encode(std::fs::read(image)?);
    let mut params = vec![("name", name)];
    if let Some(split) = split {
      params.push(("split", split.as_str()));
    }
    let url = self.api_url("upload", &params)?;

    let text = self.post(url, "application/x-www-form-urlencoded", body)?;
    let response: UploadResponse = serde_json::from_str(&text)
      .map_err(|_| RoboflowUploadError::UnexpectedResponse(text.clone()))?;
    if response.duplicate {
      debug!("{} 已存在于数据集中", name);
    }
    response
      .id
      .ok_or(RoboflowUploadError::UnexpectedResponse(text))
  }
}

impl Upload for RoboflowUpload {
  type Error = RoboflowUploadError;

  fn upload(
    &self,
    image: &Path,
    annotations: &[Annotation],
    split: Option<Split>,
  ) -> Result<(), Self::Error> {
    let payload = AnnotationPayload::new(image, annotations);
    let image_id = self.upload_image(image, payload.name, split)?;
    debug!("图像 {} 上传完成，id = {}", payload.name, image_id);

    let stem = image
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or(payload.name);
    let annotation_name = format!("{}.json", stem);
    let url = self.api_url(
      &format!("annotate/{}", image_id),
      &[("name", annotation_name.as_str())],
    )?;
    self.post(url, "application/json", serde_json::to_string(&payload)?)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::annotation::AnnotationClass;
  use std::{sync::mpsc, thread};
  use tiny_http::{Response, Server};

  struct Recorded {
    url: String,
    body: String,
  }

  /// 启动一个只应答 `replies.len()` 次的本地假服务
  fn fake_api(replies: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Recorded>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
      for (status, reply) in replies {
        let mut request = match server.recv() {
          Ok(request) => request,
          Err(_) => return,
        };
        let body = std::io::read_to_string(request.as_reader()).unwrap();
        tx.send(Recorded {
          url: request.url().to_string(),
          body,
        })
        .unwrap();
        request
          .respond(Response::from_string(reply).with_status_code(status))
          .unwrap();
      }
    });

    (format!("http://127.0.0.1:{}", port), rx)
  }

  fn uploader(endpoint: &str) -> RoboflowUpload {
    let url = Url::parse(&format!(
      "roboflow://maistro/sheet-music-omr?endpoint={}",
      endpoint
    ))
    .unwrap();
    RoboflowUploadBuilder::from_url(&url)
      .unwrap()
      .with_timeout(Duration::from_secs(5))
      .build(ApiKey::new("secret").unwrap())
      .unwrap()
  }

  fn annotations() -> Vec<Annotation> {
    vec![Annotation {
      class: AnnotationClass::StaffLine,
      x: 0.25,
      y: 0.5,
      width: 0.5,
      height: 0.01,
    }]
  }

  #[test]
  fn parses_workspace_project_and_endpoint() {
    let url = Url::parse("roboflow://maistro/sheet-music-omr").unwrap();
    let builder = RoboflowUploadBuilder::from_url(&url).unwrap();
    assert_eq!(builder.workspace, "maistro");
    assert_eq!(builder.project, "sheet-music-omr");
    assert_eq!(builder.endpoint, DEFAULT_ENDPOINT);

    let url = Url::parse("roboflow://maistro/").unwrap();
    assert!(matches!(
      RoboflowUploadBuilder::from_url(&url),
      Err(RoboflowUploadError::InvalidUrl(_))
    ));
  }

  #[test]
  fn uploads_image_then_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("page-01.png");
    std::fs::write(&image, b"\x89PNG fake bytes").unwrap();

    let (endpoint, requests) = fake_api(vec![
      (200, r#"{"success": true, "id": "abc123"}"#),
      (200, r#"{"success": true}"#),
    ]);
    uploader(&endpoint)
      .upload(&image, &annotations(), Some(Split::Train))
      .unwrap();

    let first = requests.recv().unwrap();
    assert!(first.url.starts_with("/dataset/sheet-music-omr/upload?"));
    assert!(first.url.contains("api_key=secret"));
    assert!(first.url.contains("name=page-01.png"));
    assert!(first.url.contains("split=train"));
    assert_eq!(first.body, STANDARD.encode(b"\x89PNG fake bytes"));

    let second = requests.recv().unwrap();
    assert!(second.url.starts_with("/dataset/sheet-music-omr/annotate/abc123?"));
    assert!(second.url.contains("name=page-01.json"));
    let payload: serde_json::Value = serde_json::from_str(&second.body).unwrap();
    assert_eq!(payload["name"], "page-01.png");
    assert_eq!(payload["annotations"][0]["class"], "staff_line");
  }

  #[test]
  fn server_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("page-02.png");
    std::fs::write(&image, b"bytes").unwrap();

    let (endpoint, _requests) = fake_api(vec![(500, "boom")]);
    let result = uploader(&endpoint).upload(&image, &annotations(), None);
    assert!(matches!(result, Err(RoboflowUploadError::ApiError(500, _))));
  }

  #[test]
  fn missing_image_id_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("page-03.png");
    std::fs::write(&image, b"bytes").unwrap();

    let (endpoint, _requests) = fake_api(vec![(200, r#"{"error": "quota"}"#)]);
    let result = uploader(&endpoint).upload(&image, &annotations(), None);
    assert!(matches!(
      result,
      Err(RoboflowUploadError::UnexpectedResponse(_))
    ));
  }
}
