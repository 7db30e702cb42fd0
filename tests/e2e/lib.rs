#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use aim_operator::crd::common::{ModelSourceSpec, TemplatePhase, TemplateSpec};
    use aim_operator::crd::{AIMCache, AIMModel, AIMModelSpec, AIMServiceTemplate, AIMServiceTemplateSpec};
    use kube::api::{Api, Patch, PatchParams, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tokio::time::timeout;

    fn is_template_ready() -> impl Condition<AIMServiceTemplate> {
        |obj: Option<&AIMServiceTemplate>| {
            obj.and_then(|t| t.status.as_ref())
                .is_some_and(|s| s.status == TemplatePhase::Ready)
        }
    }

    fn is_template_not_ready() -> impl Condition<AIMServiceTemplate> {
        |obj: Option<&AIMServiceTemplate>| {
            !obj.and_then(|t| t.status.as_ref())
                .is_some_and(|s| s.status == TemplatePhase::Ready)
        }
    }

    fn is_template_failed() -> impl Condition<AIMServiceTemplate> {
        |obj: Option<&AIMServiceTemplate>| {
            obj.and_then(|t| t.status.as_ref())
                .is_some_and(|s| s.status == TemplatePhase::Failed)
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(
            Duration::from_secs(30),
            await_condition(api, name, condition),
        )
        .await
        .unwrap()
        .unwrap();
    }

    fn model(name: &str) -> AIMModel {
        AIMModel::new(
            name,
            AIMModelSpec {
                image: "registry.example.com/models/llama3:v1".to_owned(),
                image_pull_secrets: None,
                service_account_name: None,
                model_sources: None,
            },
        )
    }

    fn template(name: &str, model_name: &str) -> AIMServiceTemplate {
        AIMServiceTemplate::new(
            name,
            AIMServiceTemplateSpec {
                template: TemplateSpec {
                    model_name: model_name.to_owned(),
                    model_sources: Some(vec![ModelSourceSpec {
                        model_id: model_name.to_owned(),
                        source_uri: "hf://meta-llama/llama-3-8b".to_owned(),
                        size: None,
                        env: None,
                    }]),
                    ..Default::default()
                },
            },
        )
    }

    async fn setup(name: &str) -> (Api<AIMModel>, Api<AIMServiceTemplate>) {
        let client = Client::try_default().await.unwrap();
        let model_api = Api::<AIMModel>::namespaced(client.clone(), "default");
        let template_api = Api::<AIMServiceTemplate>::namespaced(client.clone(), "default");

        model_api
            .create(&PostParams::default(), &model(name))
            .await
            .unwrap();
        template_api
            .create(&PostParams::default(), &template(name, name))
            .await
            .unwrap();

        wait_for(template_api.clone(), name, is_template_ready()).await;
        (model_api, template_api)
    }

    #[tokio::test]
    async fn template_create() {
        let name = "test-create";
        setup(name).await;
    }

    #[tokio::test]
    async fn template_missing_model_fails() {
        let name = "test-missing-model";
        let client = Client::try_default().await.unwrap();
        let template_api = Api::<AIMServiceTemplate>::namespaced(client.clone(), "default");

        template_api
            .create(&PostParams::default(), &template(name, "does-not-exist"))
            .await
            .unwrap();

        wait_for(template_api.clone(), name, is_template_failed()).await;

        template_api.delete(name, &Default::default()).await.unwrap();
    }

    #[tokio::test]
    async fn template_change_triggers_reprogress() {
        let name = "test-change";
        let (model_api, template_api) = setup(name).await;

        let mut tpl = template_api.get(name).await.unwrap();
        tpl.spec.template.precision = Some("fp8".to_owned());
        tpl.metadata.managed_fields = None;
        template_api
            .patch(
                name,
                &PatchParams::apply("e2e-tests").force(),
                &Patch::Apply(&tpl),
            )
            .await
            .unwrap();

        wait_for(template_api.clone(), name, is_template_not_ready()).await;
        wait_for(template_api.clone(), name, is_template_ready()).await;

        template_api.delete(name, &Default::default()).await.unwrap();
        model_api.delete(name, &Default::default()).await.unwrap();
    }

    #[tokio::test]
    async fn template_delete_cleans_up_cache() {
        let name = "test-delete-cache";
        let client = Client::try_default().await.unwrap();
        let model_api = Api::<AIMModel>::namespaced(client.clone(), "default");
        let template_api = Api::<AIMServiceTemplate>::namespaced(client.clone(), "default");
        let cache_api = Api::<AIMCache>::namespaced(client.clone(), "default");

        model_api
            .create(&PostParams::default(), &model(name))
            .await
            .unwrap();
        let mut tpl = template(name, name);
        tpl.spec.template.caching = Some(aim_operator::crd::common::CachingSpec {
            enabled: true,
            env: None,
        });
        template_api.create(&PostParams::default(), &tpl).await.unwrap();

        wait_for(template_api.clone(), name, is_template_ready()).await;
        let cache = cache_api.get(name).await.unwrap();

        template_api.delete(name, &Default::default()).await.unwrap();

        wait_for(
            cache_api.clone(),
            name,
            conditions::is_deleted(&cache.uid().unwrap()),
        )
        .await;

        model_api.delete(name, &Default::default()).await.unwrap();
    }
}
