//! APK Signing
//!
//! Sign APKs with uber-apk-signer and generate keystores with keytool.

use std::path::PathBuf;

use apkshell_android_toolchain::{ToolContext, DEFAULT_TIMEOUT_SECS, KEYTOOL_TIMEOUT_SECS};
use apkshell_core::{spawn_worker, ProgressSink, ShellError, SigningConfig, Tool, WorkerHandle};
use tracing::info;

use crate::tool_run::{jar_invocation, run_checked};
use crate::EngineError;

/// Distinguished name given to generated keys
pub const DEFAULT_DNAME: &str = "CN=APK Shell, OU=Development, O=APK Shell, L=Unknown, ST=Unknown, C=US";

/// Keystore information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreCredentials {
    pub path: PathBuf,
    pub password: String,
    pub alias: String,
    pub alias_password: String,
}

/// Signing configuration
#[derive(Debug, Clone)]
pub struct SignOptions {
    pub apk: PathBuf,
    /// Debug key when `None`
    pub keystore: Option<KeystoreCredentials>,
    pub zipalign: bool,
}

impl SignOptions {
    /// Options from the persisted signing defaults
    pub fn from_config(apk: PathBuf, signing: &SigningConfig) -> Self {
        let keystore = signing
            .keystore
            .as_ref()
            .filter(|_| signing.has_keystore())
            .map(|path| KeystoreCredentials {
                path: path.clone(),
                password: signing.keystore_password.clone(),
                alias: signing.alias.clone(),
                alias_password: signing.alias_password.clone(),
            });
        Self {
            apk,
            keystore,
            zipalign: signing.zipalign,
        }
    }

    pub fn signer_args(&self) -> Vec<String> {
        let mut args = vec![
            "-a".to_string(),
            self.apk.display().to_string(),
            "--allowResign".to_string(),
            "--overwrite".to_string(),
        ];
        if !self.zipalign {
            args.push("--skipZipAlign".to_string());
        }
        if let Some(ks) = &self.keystore {
            args.extend([
                "--ks".to_string(),
                ks.path.display().to_string(),
                "--ksPass".to_string(),
                ks.password.clone(),
                "--ksAlias".to_string(),
                ks.alias.clone(),
                "--ksKeyPass".to_string(),
                ks.alias_password.clone(),
            ]);
        }
        args
    }
}

/// Signs an APK in place
pub struct SignApk {
    context: ToolContext,
    options: SignOptions,
}

impl SignApk {
    pub fn new(context: ToolContext, options: SignOptions) -> Self {
        Self { context, options }
    }

    async fn run(&self, sink: &ProgressSink<PathBuf>) -> Result<PathBuf, EngineError> {
        let java = self.context.require(Tool::Java).await?;
        let mut args = jar_invocation(&self.context, Tool::UberApkSigner).await?;
        args.extend(self.options.signer_args());

        info!("Signing {:?}", self.options.apk);
        sink.progress(25, "Running uber-apk-signer...");
        run_checked(&self.context, "uber-apk-signer", &java, &args, DEFAULT_TIMEOUT_SECS).await?;
        sink.progress(100, "Signed");
        Ok(self.options.apk.clone())
    }

    pub fn spawn(self) -> WorkerHandle<PathBuf> {
        spawn_worker("sign", move |sink| async move { self.run(&sink).await })
    }
}

/// Parameters of a new keystore
#[derive(Debug, Clone)]
pub struct KeystoreRequest {
    pub credentials: KeystoreCredentials,
    pub validity_days: u32,
    /// `RSA`, `DSA` or `EC`
    pub key_algorithm: String,
    pub key_size: u32,
}

impl KeystoreRequest {
    pub fn new(credentials: KeystoreCredentials) -> Self {
        Self {
            credentials,
            validity_days: 10000,
            key_algorithm: "RSA".to_string(),
            key_size: 2048,
        }
    }

    pub fn keytool_args(&self) -> Vec<String> {
        let ks = &self.credentials;
        vec![
            "-genkeypair".to_string(),
            "-v".to_string(),
            "-keystore".to_string(),
            ks.path.display().to_string(),
            "-alias".to_string(),
            ks.alias.clone(),
            "-keyalg".to_string(),
            self.key_algorithm.clone(),
            "-keysize".to_string(),
            self.key_size.to_string(),
            "-validity".to_string(),
            self.validity_days.to_string(),
            "-storepass".to_string(),
            ks.password.clone(),
            "-keypass".to_string(),
            ks.alias_password.clone(),
            "-dname".to_string(),
            DEFAULT_DNAME.to_string(),
        ]
    }
}

/// Generates a keystore with the JDK's keytool
pub struct GenerateKeystore {
    context: ToolContext,
    request: KeystoreRequest,
}

impl GenerateKeystore {
    pub fn new(context: ToolContext, request: KeystoreRequest) -> Self {
        Self { context, request }
    }

    async fn run(&self, sink: &ProgressSink<PathBuf>) -> Result<PathBuf, EngineError> {
        self.context.require(Tool::Java).await?;
        let keytool = self.context.locator().keytool().await.ok_or_else(|| {
            ShellError::Config("keytool not found next to java; make sure a full JDK is installed".to_string())
        })?;

        sink.progress(25, "Generating keystore...");
        let path = &self.request.credentials.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Generating keystore {:?}", path);
        run_checked(&self.context, "keytool", &keytool, &self.request.keytool_args(), KEYTOOL_TIMEOUT_SECS).await?;

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(EngineError::PostCondition(format!("keystore {:?} was not created", path)));
        }
        sink.progress(100, "Keystore generated");
        Ok(path.clone())
    }

    pub fn spawn(self) -> WorkerHandle<PathBuf> {
        spawn_worker("generate-keystore", move |sink| async move { self.run(&sink).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(path: &str) -> KeystoreCredentials {
        KeystoreCredentials {
            path: path.into(),
            password: "storepw".into(),
            alias: "release".into(),
            alias_password: "keypw".into(),
        }
    }

    #[test]
    fn test_signer_args_without_keystore() {
        let options = SignOptions {
            apk: "/work/app.apk".into(),
            keystore: None,
            zipalign: true,
        };
        assert_eq!(options.signer_args(), vec!["-a", "/work/app.apk", "--allowResign", "--overwrite"]);
    }

    #[test]
    fn test_signer_args_with_keystore_and_no_zipalign() {
        let options = SignOptions {
            apk: "/work/app.apk".into(),
            keystore: Some(credentials("/keys/release.jks")),
            zipalign: false,
        };
        assert_eq!(
            options.signer_args(),
            vec![
                "-a", "/work/app.apk", "--allowResign", "--overwrite", "--skipZipAlign",
                "--ks", "/keys/release.jks", "--ksPass", "storepw", "--ksAlias", "release", "--ksKeyPass", "keypw",
            ]
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut signing = SigningConfig::default();
        let options = SignOptions::from_config("/a.apk".into(), &signing);
        assert!(options.keystore.is_none());
        assert!(options.zipalign);

        signing.keystore = Some("/keys/release.jks".into());
        signing.keystore_password = "storepw".into();
        signing.alias = "release".into();
        signing.alias_password = "keypw".into();
        signing.zipalign = false;
        let options = SignOptions::from_config("/a.apk".into(), &signing);
        assert_eq!(options.keystore, Some(credentials("/keys/release.jks")));
        assert!(!options.zipalign);
    }

    #[test]
    fn test_keytool_args() {
        let request = KeystoreRequest::new(credentials("/keys/new.jks"));
        let args = request.keytool_args();
        assert_eq!(
            &args[..12],
            &[
                "-genkeypair", "-v", "-keystore", "/keys/new.jks", "-alias", "release", "-keyalg", "RSA",
                "-keysize", "2048", "-validity", "10000",
            ]
        );
        assert_eq!(&args[12..16], &["-storepass", "storepw", "-keypass", "keypw"]);
        assert_eq!(args[16], "-dname");
        assert_eq!(args[17], DEFAULT_DNAME);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keystore_generation_creates_parent_and_checks_file() {
        use apkshell_core::AppConfig;

        use crate::test_support::script;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("jdk").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let java = script(&bin, "java", "exit 0");
        // Writes the file named after -keystore
        script(&bin, "keytool", "touch \"$4\"");

        let mut config = AppConfig::default();
        config.tools.java_exe = Some(java);
        let context = ToolContext::new(config, None).await;

        let target = dir.path().join("keys").join("nested").join("release.jks");
        let request = KeystoreRequest::new(KeystoreCredentials {
            path: target.clone(),
            password: "storepw".into(),
            alias: "release".into(),
            alias_password: "keypw".into(),
        });
        let path = GenerateKeystore::new(context, request).spawn().wait().await.into_result().unwrap();
        assert_eq!(path, target);
        assert!(target.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keystore_missing_after_success_is_post_condition() {
        use apkshell_core::AppConfig;

        use crate::test_support::script;

        let dir = tempfile::tempdir().unwrap();
        let java = script(dir.path(), "java", "exit 0");
        script(dir.path(), "keytool", "exit 0");

        let mut config = AppConfig::default();
        config.tools.java_exe = Some(java);
        let context = ToolContext::new(config, None).await;

        let request = KeystoreRequest::new(credentials(dir.path().join("ks.jks").to_str().unwrap()));
        let err = GenerateKeystore::new(context, request)
            .spawn()
            .wait()
            .await
            .into_result()
            .unwrap_err();
        assert!(err.starts_with("Post-condition failed"));
    }
}
