//! Black-box pipeline tests exercising the offline stages end to end:
//! classify a usage, generate its private target name, detect it in a
//! GitOps manifest, and rewrite that manifest. Stages that require a live
//! collaborator (cluster, registry, git host) are exercised individually in
//! their own module's `#[cfg(test)]` suite instead.

use std::collections::HashMap;

use privateer::gitops::replacer::{self, Replacement};
use privateer::gitops::scanner::{DetectionResult, FileKind, FileScanner};
use privateer::image::{generate_target_name, Classification, Classifier, ImageReference};
use privateer::registry::{RegistryConfig, RegistryKind};

fn harbor_config() -> RegistryConfig {
    RegistryConfig {
        name: "harbor".to_string(),
        kind: RegistryKind::ProjectScoped,
        enabled: true,
        priority: 10,
        url: Some("harbor.internal.example.com".to_string()),
        username: None,
        password: None,
        insecure: false,
        project: Some("mirror".to_string()),
        region: None,
        account_id: None,
        org_or_user: None,
    }
}

#[test]
fn public_image_reaches_a_stable_private_target_and_rewrites_its_manifest() {
    let public_image = "nginx:1.25.3";

    let classifier = Classifier::default();
    assert_eq!(classifier.classify(public_image), Classification::Public);

    let parsed = ImageReference::parse(public_image).unwrap();
    let cfg = harbor_config();
    let target = generate_target_name(&parsed, &cfg).unwrap();
    assert_eq!(target, "harbor.internal.example.com/mirror/library/nginx:1.25.3");

    // simulate a batch-validated map: cluster migration already proved this
    // target exists privately.
    let validated_map: HashMap<String, String> = [(public_image.to_string(), target.clone())].into_iter().collect();

    let manifest = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  template:\n    spec:\n      containers:\n        - name: web\n          image: nginx:1.25.3\n";
    let public_index = FileScanner::public_image_index(&[]);
    let mut index = public_index;
    index.insert(public_image.to_string());

    let kind = FileScanner::classify_file("deploy.yaml", manifest);
    assert_eq!(kind, FileKind::KubernetesManifest);

    let detections: Vec<DetectionResult> = FileScanner::scan_file("deploy.yaml", manifest, kind, &index);
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].full_image, public_image);

    let replacements: Vec<Replacement> = detections
        .iter()
        .filter_map(|d| validated_map.get(&d.full_image).map(|t| Replacement::from_detection(d, t.clone())))
        .collect();
    assert_eq!(replacements.len(), 1);

    let (rewritten, fired) = replacer::apply("deploy.yaml", manifest, &replacements).unwrap();
    assert_eq!(fired.len(), 1);
    assert!(rewritten.contains(&format!("image: {target}")));
    assert!(!rewritten.contains("image: nginx:1.25.3"));
}

#[test]
fn unvalidated_detection_never_reaches_the_replacer() {
    // an image the classifier calls public but that batch validation never
    // confirmed exists privately must not be rewritten: drop silently
    // rather than guessing a target.
    let manifest = "kind: Deployment\nimage: redis:7\n";
    let index = FileScanner::public_image_index(&[]);
    let mut index = index;
    index.insert("redis:7".to_string());

    let kind = FileScanner::classify_file("deploy.yaml", manifest);
    let detections = FileScanner::scan_file("deploy.yaml", manifest, kind, &index);
    assert_eq!(detections.len(), 1);

    let validated_map: HashMap<String, String> = HashMap::new();
    let replacements: Vec<Replacement> = detections
        .iter()
        .filter_map(|d| validated_map.get(&d.full_image).map(|t| Replacement::from_detection(d, t.clone())))
        .collect();
    assert!(replacements.is_empty());

    let (rewritten, fired) = replacer::apply("deploy.yaml", manifest, &replacements).unwrap();
    assert!(fired.is_empty());
    assert_eq!(rewritten, manifest);
}

#[test]
fn ignored_registry_is_never_classified_as_a_migration_candidate() {
    let classifier = Classifier::new(vec!["registry.internal.example.com".to_string()], vec![], vec![]);
    assert_eq!(
        classifier.classify("registry.internal.example.com/infra/tool:2.0"),
        Classification::Ignored
    );
}
